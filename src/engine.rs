//! Contract of the type-analysis engine.
//!
//! The engine owns parsing and type analysis for one configuration boundary
//! and answers position-based queries over it. This crate never inspects
//! syntax trees directly; everything it needs is expressed through this
//! trait, including the identifier spans that power workspace-wide
//! reference scans.
//!
//! All offsets are byte offsets into the file text as held by the overlay
//! store. Span conversions to line/character positions happen in the
//! orchestration layer via [`crate::position::LineMap`].

use serde::{Deserialize, Serialize};

use crate::config::FormatCodeSettings;
use crate::error::EngineError;

/// A contiguous span of file text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: u32,
    pub length: u32,
}

impl TextSpan {
    pub fn new(start: u32, length: u32) -> Self {
        TextSpan { start, length }
    }

    pub fn end(&self) -> u32 {
        self.start + self.length
    }
}

/// A raw definition result: where a symbol is declared plus the metadata
/// needed to build a `SymbolDescriptor` without touching the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionEntry {
    pub file_name: String,
    pub text_span: TextSpan,
    /// Element kind string, e.g. `function`, `class`, `module`.
    pub kind: String,
    pub name: String,
    pub container_kind: String,
    pub container_name: String,
}

/// A raw reference result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEntry {
    pub file_name: String,
    pub text_span: TextSpan,
    /// Whether this reference is the declaration itself.
    pub is_definition: bool,
}

/// Quick-info (hover) payload for a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickInfo {
    pub kind: String,
    /// Comma-separated modifier list, e.g. `export,declare`.
    pub kind_modifiers: String,
    pub text_span: TextSpan,
    /// Rendered declaration text, possibly prefixed with a parenthesized
    /// element classification.
    pub display_text: String,
    pub documentation: String,
}

/// One node of the navigation tree for a file. The root node represents the
/// file itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationTree {
    pub text: String,
    pub kind: String,
    pub spans: Vec<TextSpan>,
    pub child_items: Vec<NavigationTree>,
}

/// A workspace navigate-to candidate produced for a text query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigateToItem {
    pub name: String,
    pub kind: String,
    pub file_name: String,
    pub text_span: TextSpan,
    pub container_name: String,
    pub container_kind: String,
}

/// Whether and how the symbol at a position may be renamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameInfo {
    pub can_rename: bool,
    /// Reason rename is refused, when `can_rename` is false.
    pub localized_error_message: Option<String>,
}

/// One location a rename must edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameLocation {
    pub file_name: String,
    pub text_span: TextSpan,
}

/// A completion candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEntry {
    pub name: String,
    pub kind: String,
    pub sort_text: Option<String>,
}

/// Resolved details for a completion candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEntryDetails {
    pub name: String,
    pub kind: String,
    pub display_text: String,
    pub documentation: String,
    /// Parameter names in declaration order, for snippet construction.
    pub parameter_names: Vec<String>,
}

/// One signature overload for signature help.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureItem {
    pub prefix: String,
    pub suffix: String,
    pub separator: String,
    pub parameters: Vec<SignatureParameter>,
    pub documentation: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParameter {
    pub label: String,
    pub documentation: String,
}

/// Signature help for a call position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHelpItems {
    pub items: Vec<SignatureItem>,
    pub selected_item_index: u32,
    pub argument_index: u32,
}

/// A code fix suggested by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFixAction {
    pub description: String,
    pub changes: Vec<FileTextChanges>,
}

/// Edits to a single file. Serializable because code-fix commands carry
/// these through the client and back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTextChanges {
    pub file_name: String,
    pub text_changes: Vec<TextChange>,
}

/// A single text replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChange {
    pub span: TextSpan,
    pub new_text: String,
}

/// Severity category of an engine diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCategory {
    Error,
    Warning,
    Suggestion,
    Message,
}

/// A diagnostic reported by the engine.
///
/// The engine can report diagnostics without a file and span in some cases;
/// those cannot be represented to the client and are filtered out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineDiagnostic {
    pub file: Option<String>,
    pub start: u32,
    pub length: u32,
    pub message: String,
    pub category: DiagnosticCategory,
    pub code: u32,
}

/// The analysis engine for one configuration boundary.
///
/// Fetch-ensuring happens before these calls through the project manager;
/// the engine itself only sees materialized files. Calls taking a position
/// may fail on malformed positions — bulk scans catch that per item.
pub trait LanguageAnalyzer {
    /// Definitions of the symbol at `offset` in `file_name`.
    fn definitions_at(&self, file_name: &str, offset: u32)
    -> Result<Vec<DefinitionEntry>, EngineError>;

    /// All references to the symbol at `offset`, declarations included.
    fn references_at(&self, file_name: &str, offset: u32) -> Vec<ReferenceEntry>;

    /// Hover information at `offset`, if any symbol is there.
    fn quick_info_at(&self, file_name: &str, offset: u32) -> Option<QuickInfo>;

    /// Completion candidates at `offset`. `None` when the position does not
    /// admit completions.
    fn completions_at(&self, file_name: &str, offset: u32) -> Option<Vec<CompletionEntry>>;

    /// Details for a previously returned completion candidate.
    fn completion_entry_details(
        &self,
        file_name: &str,
        offset: u32,
        entry_name: &str,
    ) -> Option<CompletionEntryDetails>;

    /// The navigation tree of a file.
    fn navigation_tree(&self, file_name: &str) -> Result<NavigationTree, EngineError>;

    /// Navigate-to candidates for a text query, capped at `max_results`.
    fn navigate_to_items(&self, query: &str, max_results: usize) -> Vec<NavigateToItem>;

    /// Signature help at a call position.
    fn signature_help_at(&self, file_name: &str, offset: u32) -> Option<SignatureHelpItems>;

    /// Code fixes for a span and set of diagnostic codes, formatted per the
    /// session's format settings.
    fn code_fixes_at(
        &self,
        file_name: &str,
        start: u32,
        end: u32,
        error_codes: &[u32],
        format: &FormatCodeSettings,
    ) -> Vec<CodeFixAction>;

    /// Whether the symbol at `offset` can be renamed.
    fn rename_info(&self, file_name: &str, offset: u32) -> RenameInfo;

    /// Every location a rename of the symbol at `offset` must edit.
    fn rename_locations(&self, file_name: &str, offset: u32) -> Vec<RenameLocation>;

    /// Spans of every identifier-kind syntax node in a file, in document
    /// order. Powers workspace-wide reference scans.
    fn identifier_spans(&self, file_name: &str) -> Vec<TextSpan>;

    /// Parse diagnostics for a file.
    fn syntactic_diagnostics(&self, file_name: &str) -> Vec<EngineDiagnostic>;

    /// Type-check diagnostics for a file.
    fn semantic_diagnostics(&self, file_name: &str) -> Vec<EngineDiagnostic>;
}
