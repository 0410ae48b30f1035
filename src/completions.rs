//! Completion items, kind mapping, and snippet construction.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// LSP completion item kind (numeric on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum CompletionItemKind {
    Text = 1,
    Method = 2,
    Function = 3,
    Constructor = 4,
    Field = 5,
    Variable = 6,
    Class = 7,
    Interface = 8,
    Module = 9,
    Property = 10,
    Unit = 11,
    Value = 12,
    Enum = 13,
    Keyword = 14,
    Snippet = 15,
    Color = 16,
    File = 17,
    Reference = 18,
}

impl From<CompletionItemKind> for u8 {
    fn from(kind: CompletionItemKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for CompletionItemKind {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Text),
            2 => Ok(Self::Method),
            3 => Ok(Self::Function),
            4 => Ok(Self::Constructor),
            5 => Ok(Self::Field),
            6 => Ok(Self::Variable),
            7 => Ok(Self::Class),
            8 => Ok(Self::Interface),
            9 => Ok(Self::Module),
            10 => Ok(Self::Property),
            11 => Ok(Self::Unit),
            12 => Ok(Self::Value),
            13 => Ok(Self::Enum),
            14 => Ok(Self::Keyword),
            15 => Ok(Self::Snippet),
            16 => Ok(Self::Color),
            17 => Ok(Self::File),
            18 => Ok(Self::Reference),
            _ => Err("invalid completion item kind"),
        }
    }
}

/// How `insert_text` is to be interpreted by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum InsertTextFormat {
    PlainText = 1,
    Snippet = 2,
}

impl From<InsertTextFormat> for u8 {
    fn from(format: InsertTextFormat) -> u8 {
        format as u8
    }
}

impl TryFrom<u8> for InsertTextFormat {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::PlainText),
            2 => Ok(Self::Snippet),
            _ => Err("invalid insert text format"),
        }
    }
}

/// Maps engine entry-kind strings to LSP completion item kinds.
static COMPLETION_KINDS: Lazy<FxHashMap<&'static str, CompletionItemKind>> = Lazy::new(|| {
    [
        ("class", CompletionItemKind::Class),
        ("constructor", CompletionItemKind::Constructor),
        ("enum", CompletionItemKind::Enum),
        ("field", CompletionItemKind::Field),
        ("file", CompletionItemKind::File),
        ("function", CompletionItemKind::Function),
        ("interface", CompletionItemKind::Interface),
        ("keyword", CompletionItemKind::Keyword),
        ("method", CompletionItemKind::Method),
        ("module", CompletionItemKind::Module),
        ("property", CompletionItemKind::Property),
        ("reference", CompletionItemKind::Reference),
        ("snippet", CompletionItemKind::Snippet),
        ("text", CompletionItemKind::Text),
        ("unit", CompletionItemKind::Unit),
        ("value", CompletionItemKind::Value),
        ("variable", CompletionItemKind::Variable),
    ]
    .into_iter()
    .collect()
});

/// Map an engine entry-kind string to the LSP completion item kind.
pub fn completion_kind(kind: &str) -> Option<CompletionItemKind> {
    COMPLETION_KINDS.get(kind).copied()
}

/// A completion list result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionList {
    pub is_incomplete: bool,
    pub items: Vec<CompletionItem>,
}

/// A single completion item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionItem {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<CompletionItemKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_text_format: Option<InsertTextFormat>,
    /// Context carried to a later `completionItem/resolve` request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Resolve-request context attached to unresolved completion items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionData {
    pub uri: String,
    pub offset: u32,
    pub entry_name: String,
}

/// Snippet insert text for a callable: `name(${1:a}, ${2:b})`.
pub fn snippet_insert_text(name: &str, parameter_names: &[String]) -> String {
    let placeholders: Vec<String> = parameter_names
        .iter()
        .enumerate()
        .map(|(index, parameter)| format!("${{{}:{}}}", index + 1, parameter))
        .collect();
    format!("{}({})", name, placeholders.join(", "))
}

#[cfg(test)]
mod completions_tests {
    use super::*;

    #[test]
    fn test_completion_kind_mapping() {
        assert_eq!(completion_kind("class"), Some(CompletionItemKind::Class));
        assert_eq!(completion_kind("method"), Some(CompletionItemKind::Method));
        assert_eq!(completion_kind("warning"), None);
    }

    #[test]
    fn test_snippet_insert_text() {
        assert_eq!(
            snippet_insert_text("greet", &["name".to_string(), "times".to_string()]),
            "greet(${1:name}, ${2:times})"
        );
        assert_eq!(snippet_insert_text("now", &[]), "now()");
    }

    #[test]
    fn test_kind_serializes_numeric() {
        assert_eq!(
            serde_json::to_string(&CompletionItemKind::Function).unwrap(),
            "3"
        );
        assert_eq!(
            serde_json::to_string(&InsertTextFormat::Snippet).unwrap(),
            "2"
        );
    }
}
