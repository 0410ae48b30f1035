//! Symbol descriptors and conversions from raw engine results.
//!
//! A `SymbolDescriptor` is the structured identity of a symbol: its name,
//! its container, its kind, and optionally the package it lives in. It is
//! what cross-repository queries match against, so building one must be
//! deterministic and free of file-system access, and paths inside it are
//! normalized relative to the workspace root so that two servers looking at
//! the same code produce identical descriptors.

use serde::{Deserialize, Serialize};

use crate::engine::{DefinitionEntry, NavigateToItem, NavigationTree};
use crate::packages::PackageDescriptor;
use crate::position::Location;
use crate::project::SourceFile;
use crate::uri::path_to_uri;

/// Element kind string for modules, as reported by the engine.
pub const MODULE_KIND: &str = "module";

/// Structured identity of a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolDescriptor {
    pub name: String,
    pub container_name: String,
    pub container_kind: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageDescriptor>,
}

/// LSP symbol kind (numeric on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum SymbolKind {
    File = 1,
    Module = 2,
    Namespace = 3,
    Package = 4,
    Class = 5,
    Method = 6,
    Property = 7,
    Field = 8,
    Constructor = 9,
    Enum = 10,
    Interface = 11,
    Function = 12,
    Variable = 13,
    Constant = 14,
    String = 15,
    Number = 16,
    Boolean = 17,
    Array = 18,
}

impl From<SymbolKind> for u8 {
    fn from(kind: SymbolKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for SymbolKind {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::File),
            2 => Ok(Self::Module),
            3 => Ok(Self::Namespace),
            4 => Ok(Self::Package),
            5 => Ok(Self::Class),
            6 => Ok(Self::Method),
            7 => Ok(Self::Property),
            8 => Ok(Self::Field),
            9 => Ok(Self::Constructor),
            10 => Ok(Self::Enum),
            11 => Ok(Self::Interface),
            12 => Ok(Self::Function),
            13 => Ok(Self::Variable),
            14 => Ok(Self::Constant),
            15 => Ok(Self::String),
            16 => Ok(Self::Number),
            17 => Ok(Self::Boolean),
            18 => Ok(Self::Array),
            _ => Err("invalid symbol kind"),
        }
    }
}

/// Map an engine element-kind string to the LSP symbol kind.
pub fn symbol_kind_from_str(kind: &str) -> SymbolKind {
    match kind {
        "module" | "script" => SymbolKind::Module,
        "class" | "local class" => SymbolKind::Class,
        "interface" => SymbolKind::Interface,
        "enum" => SymbolKind::Enum,
        "enum member" => SymbolKind::Constant,
        "function" | "local function" => SymbolKind::Function,
        "method" | "getter" | "setter" => SymbolKind::Method,
        "constructor" => SymbolKind::Constructor,
        "property" | "JSX attribute" => SymbolKind::Property,
        "const" => SymbolKind::Constant,
        "string" => SymbolKind::String,
        "type parameter" => SymbolKind::Variable,
        _ => SymbolKind::Variable,
    }
}

/// A search or document-symbol result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInformation {
    pub name: String,
    pub kind: SymbolKind,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
}

/// A definition described by metadata, with a concrete location when one
/// could be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolLocationInformation {
    pub symbol: SymbolDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// Strip one pair of surrounding quotes, if present. Engine results quote
/// module names (`"lodash"`).
pub fn strip_quotes(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &text[1..text.len() - 1];
        }
    }
    text
}

/// Module name for a file path: workspace-root relative, leading slash,
/// source extension removed. Paths outside the root keep their absolute
/// form minus the extension.
pub fn module_name_for_path(file_name: &str, root_path: &str) -> String {
    let relative = file_name
        .strip_prefix(root_path)
        .unwrap_or(file_name)
        .trim_start_matches('/');
    let without_extension = strip_source_extension(relative);
    format!("/{without_extension}")
}

fn strip_source_extension(path: &str) -> &str {
    for extension in [".d.ts", ".tsx", ".ts", ".jsx", ".js"] {
        if let Some(stripped) = path.strip_suffix(extension) {
            return stripped;
        }
    }
    path
}

/// URI for a location produced from an engine file name.
pub fn location_uri(file_name: &str) -> String {
    path_to_uri(file_name)
}

/// Build a `SymbolDescriptor` from a raw definition result.
///
/// Pure: identical input always yields an identical descriptor. That makes
/// descriptors safe to hash for deduplication.
pub fn definition_to_descriptor(entry: &DefinitionEntry, root_path: &str) -> SymbolDescriptor {
    let mut name = strip_quotes(&entry.name).to_string();
    let mut container_name = strip_quotes(&entry.container_name).to_string();
    let mut container_kind = entry.container_kind.clone();

    // A module symbol named by a file path gets a root-relative module name
    if entry.kind == MODULE_KIND && name.contains('/') {
        name = module_name_for_path(&name, root_path);
    }

    if entry.kind != MODULE_KIND && container_kind.is_empty() && container_name.is_empty() {
        // Top-level symbols have no syntactic container; the container is
        // the module named by the defining file
        container_name = module_name_for_path(&entry.file_name, root_path);
        container_kind = MODULE_KIND.to_string();
    } else if container_name.contains('/') {
        container_name = module_name_for_path(&container_name, root_path);
    }

    SymbolDescriptor {
        name,
        container_name,
        container_kind,
        kind: entry.kind.clone(),
        package: None,
    }
}

/// One visited node of a navigation tree walk, with its nearest parent.
#[derive(Debug, Clone, Copy)]
pub struct NavigationTreeNode<'a> {
    pub tree: &'a NavigationTree,
    pub parent: Option<&'a NavigationTree>,
}

/// Walk a navigation tree pre-order, pairing every node with its parent.
pub fn walk_navigation_tree(root: &NavigationTree) -> Vec<NavigationTreeNode<'_>> {
    let mut nodes = Vec::new();
    let mut stack: Vec<NavigationTreeNode<'_>> = vec![NavigationTreeNode {
        tree: root,
        parent: None,
    }];
    while let Some(node) = stack.pop() {
        for child in node.tree.child_items.iter().rev() {
            stack.push(NavigationTreeNode {
                tree: child,
                parent: Some(node.tree),
            });
        }
        nodes.push(node);
    }
    nodes
}

/// Whether a navigation tree node names a real symbol. Anonymous
/// functions/classes and the file-level script node are not symbols.
pub fn navigation_tree_is_symbol(tree: &NavigationTree) -> bool {
    if tree.text.is_empty() || tree.text == "<function>" || tree.text == "<class>" {
        return false;
    }
    tree.kind != "script"
}

/// Build a `SymbolDescriptor` for a navigation tree node.
pub fn navigation_tree_to_descriptor(
    tree: &NavigationTree,
    parent: Option<&NavigationTree>,
    file_name: &str,
    root_path: &str,
) -> SymbolDescriptor {
    let symbol_parent = parent.filter(|p| navigation_tree_is_symbol(p));
    let mut container_name = symbol_parent
        .map(|p| strip_quotes(&p.text).to_string())
        .unwrap_or_default();
    let mut container_kind = symbol_parent.map(|p| p.kind.clone()).unwrap_or_default();

    if container_kind.is_empty() && container_name.is_empty() {
        container_name = module_name_for_path(file_name, root_path);
        container_kind = MODULE_KIND.to_string();
    } else if container_name.contains('/') {
        container_name = module_name_for_path(&container_name, root_path);
    }

    SymbolDescriptor {
        name: strip_quotes(&tree.text).to_string(),
        container_name,
        container_kind,
        kind: tree.kind.clone(),
        package: None,
    }
}

/// Build a `SymbolInformation` for a navigation tree node. `None` when the
/// node carries no span (nothing to point the client at).
pub fn navigation_tree_to_symbol_information(
    tree: &NavigationTree,
    parent: Option<&NavigationTree>,
    source: &SourceFile,
) -> Option<SymbolInformation> {
    let span = tree.spans.first()?;
    let container_name = parent
        .filter(|p| navigation_tree_is_symbol(p))
        .map(|p| strip_quotes(&p.text).to_string());
    Some(SymbolInformation {
        name: strip_quotes(&tree.text).to_string(),
        kind: symbol_kind_from_str(&tree.kind),
        location: Location::new(
            location_uri(&source.file_name),
            source.range_of(span.start, span.end()),
        ),
        container_name,
    })
}

/// Build a `SymbolInformation` for a navigate-to candidate.
pub fn navigate_to_item_to_symbol_information(
    item: &NavigateToItem,
    source: &SourceFile,
) -> SymbolInformation {
    let container_name = if item.container_name.is_empty() {
        None
    } else {
        Some(strip_quotes(&item.container_name).to_string())
    };
    SymbolInformation {
        name: strip_quotes(&item.name).to_string(),
        kind: symbol_kind_from_str(&item.kind),
        location: Location::new(
            location_uri(&item.file_name),
            source.range_of(item.text_span.start, item.text_span.end()),
        ),
        container_name,
    }
}

#[cfg(test)]
mod symbols_tests {
    use super::*;
    use crate::engine::TextSpan;

    fn entry(kind: &str, name: &str, container_kind: &str, container_name: &str) -> DefinitionEntry {
        DefinitionEntry {
            file_name: "/workspace/src/util.ts".to_string(),
            text_span: TextSpan::new(10, 3),
            kind: kind.to_string(),
            name: name.to_string(),
            container_kind: container_kind.to_string(),
            container_name: container_name.to_string(),
        }
    }

    #[test]
    fn test_descriptor_builder_is_deterministic() {
        let raw = entry("function", "pad", "", "");
        let first = definition_to_descriptor(&raw, "/workspace");
        let second = definition_to_descriptor(&raw, "/workspace");
        assert_eq!(first, second, "same input must build the same descriptor");
    }

    #[test]
    fn test_top_level_symbol_gets_module_container() {
        let descriptor = definition_to_descriptor(&entry("function", "pad", "", ""), "/workspace");
        assert_eq!(descriptor.container_kind, "module");
        assert_eq!(descriptor.container_name, "/src/util");
    }

    #[test]
    fn test_module_path_name_is_root_relative() {
        let mut raw = entry("module", "\"/workspace/src/util\"", "", "");
        raw.file_name = "/workspace/src/util.ts".to_string();
        let descriptor = definition_to_descriptor(&raw, "/workspace");
        assert_eq!(descriptor.name, "/src/util");
    }

    #[test]
    fn test_quoted_names_are_stripped() {
        let descriptor = definition_to_descriptor(&entry("var", "'x'", "module", "\"m\""), "/w");
        assert_eq!(descriptor.name, "x");
        assert_eq!(descriptor.container_name, "m");
    }

    #[test]
    fn test_module_name_for_path_strips_extensions() {
        assert_eq!(module_name_for_path("/w/a/b.d.ts", "/w"), "/a/b");
        assert_eq!(module_name_for_path("/w/a/b.tsx", "/w"), "/a/b");
        assert_eq!(module_name_for_path("/w/a/b.js", "/w"), "/a/b");
        assert_eq!(module_name_for_path("/other/b.ts", "/w"), "/other/b");
    }

    #[test]
    fn test_walk_navigation_tree_preorder_with_parents() {
        let tree = NavigationTree {
            text: "script".to_string(),
            kind: "script".to_string(),
            spans: vec![TextSpan::new(0, 20)],
            child_items: vec![NavigationTree {
                text: "Foo".to_string(),
                kind: "class".to_string(),
                spans: vec![TextSpan::new(0, 10)],
                child_items: vec![NavigationTree {
                    text: "bar".to_string(),
                    kind: "method".to_string(),
                    spans: vec![TextSpan::new(4, 5)],
                    child_items: vec![],
                }],
            }],
        };
        let nodes = walk_navigation_tree(&tree);
        let texts: Vec<&str> = nodes.iter().map(|n| n.tree.text.as_str()).collect();
        assert_eq!(texts, vec!["script", "Foo", "bar"]);
        assert_eq!(nodes[2].parent.unwrap().text, "Foo");
    }

    #[test]
    fn test_navigation_tree_is_symbol_excludes_anonymous() {
        let anon = NavigationTree {
            text: "<function>".to_string(),
            kind: "function".to_string(),
            spans: vec![],
            child_items: vec![],
        };
        assert!(!navigation_tree_is_symbol(&anon));

        let script = NavigationTree {
            text: "m.ts".to_string(),
            kind: "script".to_string(),
            spans: vec![],
            child_items: vec![],
        };
        assert!(!navigation_tree_is_symbol(&script));
    }

    #[test]
    fn test_symbol_kind_serializes_numeric() {
        let json = serde_json::to_string(&SymbolKind::Class).unwrap();
        assert_eq!(json, "5");
    }
}
