//! Hover construction from engine quick-info.

use serde::{Deserialize, Serialize};

use crate::engine::QuickInfo;
use crate::position::Range;
use crate::project::SourceFile;

/// One block of hover content: a fenced code block or plain markdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HoverContent {
    Code { language: String, value: String },
    Markdown(String),
}

/// Hover payload for a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hover {
    pub contents: Vec<HoverContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
}

impl Hover {
    /// Hover for a position with no symbol under it.
    pub fn empty() -> Self {
        Hover {
            contents: Vec::new(),
            range: None,
        }
    }
}

/// Build a hover from quick-info: the declaration as a code block, the
/// element kind in bold with its modifiers as adjectives, then the
/// documentation.
pub fn hover_from_quick_info(info: &QuickInfo, source: &SourceFile) -> Hover {
    let mut contents = Vec::new();

    // The declaration, without the parenthesized element classification
    // the engine prefixes it with
    contents.push(HoverContent::Code {
        language: "typescript".to_string(),
        value: strip_classification_prefix(&info.display_text).to_string(),
    });

    if !info.kind.is_empty() {
        let mut kind = format!("**{}**", info.kind);
        let modifiers: Vec<&str> = info
            .kind_modifiers
            .split(',')
            // Filter out quirks like "constructor (exported)"
            .filter(|modifier| {
                !modifier.is_empty() && !(*modifier == "export" && info.kind == "constructor")
            })
            // Make proper adjectives
            .map(|modifier| match modifier {
                "declare" => "ambient",
                "export" => "exported",
                other => other,
            })
            .collect();
        if !modifiers.is_empty() {
            kind.push_str(&format!(" _({})_", modifiers.join(", ")));
        }
        contents.push(HoverContent::Markdown(kind));
    }

    if !info.documentation.is_empty() {
        contents.push(HoverContent::Markdown(info.documentation.clone()));
    }

    Hover {
        contents,
        range: Some(source.range_of(info.text_span.start, info.text_span.end())),
    }
}

/// Strip a leading `(classification) ` prefix from a declaration rendering.
fn strip_classification_prefix(display_text: &str) -> &str {
    if !display_text.starts_with('(') {
        return display_text;
    }
    let Some(close) = display_text.find(')') else {
        return display_text;
    };
    let rest = &display_text[close + 1..];
    // Only strip when whitespace separates the prefix from the declaration
    if rest.starts_with(char::is_whitespace) {
        rest.trim_start()
    } else {
        display_text
    }
}

#[cfg(test)]
mod hover_tests {
    use super::*;
    use crate::engine::TextSpan;

    fn quick_info(kind: &str, modifiers: &str, display: &str, documentation: &str) -> QuickInfo {
        QuickInfo {
            kind: kind.to_string(),
            kind_modifiers: modifiers.to_string(),
            text_span: TextSpan::new(0, 3),
            display_text: display.to_string(),
            documentation: documentation.to_string(),
        }
    }

    #[test]
    fn test_hover_strips_classification_prefix() {
        let source = SourceFile::new("/a.ts", "let abc = 1;");
        let hover = hover_from_quick_info(
            &quick_info("let", "", "(let) abc: number", ""),
            &source,
        );
        assert_eq!(
            hover.contents[0],
            HoverContent::Code {
                language: "typescript".to_string(),
                value: "abc: number".to_string()
            }
        );
    }

    #[test]
    fn test_hover_formats_kind_with_modifiers() {
        let source = SourceFile::new("/a.ts", "abc");
        let hover = hover_from_quick_info(
            &quick_info("function", "export,declare", "fn", ""),
            &source,
        );
        assert_eq!(
            hover.contents[1],
            HoverContent::Markdown("**function** _(exported, ambient)_".to_string())
        );
    }

    #[test]
    fn test_hover_drops_exported_on_constructors() {
        let source = SourceFile::new("/a.ts", "abc");
        let hover = hover_from_quick_info(&quick_info("constructor", "export", "ctor", ""), &source);
        assert_eq!(
            hover.contents[1],
            HoverContent::Markdown("**constructor**".to_string())
        );
    }

    #[test]
    fn test_hover_includes_documentation() {
        let source = SourceFile::new("/a.ts", "abc");
        let hover = hover_from_quick_info(&quick_info("var", "", "x", "Does things."), &source);
        assert_eq!(
            hover.contents.last(),
            Some(&HoverContent::Markdown("Does things.".to_string()))
        );
    }

    #[test]
    fn test_hover_keeps_parenthesized_declarations() {
        let source = SourceFile::new("/a.ts", "abc");
        let hover = hover_from_quick_info(&quick_info("var", "", "(a: number)=>void", ""), &source);
        assert_eq!(
            hover.contents[0],
            HoverContent::Code {
                language: "typescript".to_string(),
                value: "(a: number)=>void".to_string()
            }
        );
    }
}
