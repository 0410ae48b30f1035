//! Contracts of the project/configuration manager.
//!
//! A workspace is partitioned into configuration boundaries: subtrees
//! governed by one set of compiler settings, each owning the files inside
//! it (nearest enclosing boundary wins) while possibly referencing files
//! outside. The project manager owns boundary discovery and the staged
//! materialization of files; this crate only calls its idempotent
//! `ensure_*` operations and walks the boundaries it reports.

use std::sync::Arc;

use crate::engine::LanguageAnalyzer;
use crate::error::Result;
use crate::position::{LineMap, Position, Range};

/// A materialized source file with its precomputed line map.
#[derive(Debug)]
pub struct SourceFile {
    pub file_name: String,
    pub text: String,
    line_map: LineMap,
}

impl SourceFile {
    pub fn new(file_name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let line_map = LineMap::build(&text);
        SourceFile {
            file_name: file_name.into(),
            text,
            line_map,
        }
    }

    /// Convert a byte offset in this file to a line/character position.
    pub fn position_at(&self, offset: u32) -> Position {
        self.line_map.offset_to_position(offset, &self.text)
    }

    /// Convert a line/character position to a byte offset, if in bounds.
    pub fn offset_at(&self, position: Position) -> Option<u32> {
        self.line_map.position_to_offset(position, &self.text)
    }

    /// Convert an offset span to a position range.
    pub fn range_of(&self, start: u32, end: u32) -> Range {
        Range::new(self.position_at(start), self.position_at(end))
    }
}

/// One configuration boundary of the workspace.
pub trait ProjectConfiguration {
    /// Path of the configuration file that roots this boundary.
    fn config_file_path(&self) -> &str;

    /// Materialize the files needed for single-file operations (the file
    /// set the configuration names directly). Idempotent.
    fn ensure_basic_files(&self) -> Result<()>;

    /// Materialize every file of the boundary, transitive references
    /// included. Idempotent.
    fn ensure_all_files(&self) -> Result<()>;

    /// The analysis engine for this boundary.
    fn analyzer(&self) -> &dyn LanguageAnalyzer;

    /// A materialized source file of this boundary, if present.
    fn source_file(&self, file_name: &str) -> Option<Arc<SourceFile>>;

    /// File names of every source file currently in the boundary.
    fn source_file_names(&self) -> Vec<String>;
}

/// The workspace-wide project manager.
pub trait ProjectManager {
    /// Materialize all files of the primary project (not dependencies).
    fn ensure_own_files(&self) -> Result<()>;

    /// Materialize every file in the workspace, dependencies included.
    fn ensure_all_files(&self) -> Result<()>;

    /// Materialize `uri` plus everything it references.
    fn ensure_referenced_files(&self, uri: &str) -> Result<()>;

    /// Materialize configuration and manifest files only.
    fn ensure_module_structure(&self) -> Result<()>;

    /// The boundary owning a file path. Fails when no boundary covers it.
    fn configuration_for(&self, file_path: &str) -> Result<Arc<dyn ProjectConfiguration>>;

    /// The nearest boundary rooted at or above `uri`, if any.
    fn parent_configuration(&self, uri: &str) -> Option<Arc<dyn ProjectConfiguration>>;

    /// Boundaries rooted strictly below a directory URI.
    fn child_configurations(&self, dir_uri: &str) -> Vec<Arc<dyn ProjectConfiguration>>;

    /// Every boundary of the workspace. Never includes boundaries that
    /// belong to dependencies.
    fn configurations(&self) -> Vec<Arc<dyn ProjectConfiguration>>;

    /// Whether the workspace contains `file_name` at all.
    fn has_file(&self, file_name: &str) -> bool;

    /// The client opened a document; its truth is now the overlay.
    fn did_open(&self, uri: &str, text: &str);

    /// The client changed a document.
    fn did_change(&self, uri: &str, text: &str);

    /// The client saved a document.
    fn did_save(&self, uri: &str);

    /// The client closed a document; truth returns to the file system.
    fn did_close(&self, uri: &str);
}
