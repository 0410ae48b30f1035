//! Workspace edits and the rename patch protocol.
//!
//! A rename result is an edit map keyed by URI. The stream starts with an
//! empty `{"changes": {}}` document; the first edit for a URI creates that
//! URI's array, later edits for the same URI append to it. Which shape to
//! emit is decided per rename call by tracking the URIs already
//! initialized.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::Result;
use crate::patch::{PatchOp, escape_pointer_token, to_json};
use crate::position::Range;

/// A single text edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    /// The range to replace.
    pub range: Range,
    /// The new text.
    pub new_text: String,
}

impl TextEdit {
    pub fn new(range: Range, new_text: String) -> Self {
        TextEdit { range, new_text }
    }
}

/// Edits across multiple files, keyed by URI.
///
/// Uses an insertion-ordered map so serialization and patch emission list
/// files in the order their first edit was produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceEdit {
    pub changes: IndexMap<String, Vec<TextEdit>>,
}

impl WorkspaceEdit {
    pub fn new() -> Self {
        WorkspaceEdit {
            changes: IndexMap::new(),
        }
    }

    /// Add an edit for a URI.
    pub fn add_edit(&mut self, uri: String, edit: TextEdit) {
        self.changes.entry(uri).or_default().push(edit);
    }
}

/// The patch establishing the empty edit-map shape.
pub fn empty_edit_map_patch() -> PatchOp {
    PatchOp::root(json!({ "changes": {} }))
}

/// Turn (uri, edit) pairs into the rename patch sequence: array creation
/// for a URI's first edit, array append for the rest.
pub fn rename_patches(
    edits: impl IntoIterator<Item = (String, TextEdit)> + 'static,
) -> impl Iterator<Item = Result<PatchOp>> {
    let mut initialized: FxHashSet<String> = FxHashSet::default();
    edits.into_iter().map(move |(uri, edit)| {
        let escaped = escape_pointer_token(&uri);
        if initialized.insert(uri) {
            Ok(PatchOp::add(
                format!("/changes/{escaped}"),
                json!([to_json(&edit)]),
            ))
        } else {
            Ok(PatchOp::add(format!("/changes/{escaped}/-"), to_json(&edit)))
        }
    })
}
