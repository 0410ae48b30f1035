//! Contract of the remote language client.
//!
//! The client is the party on the other end of the connection. The session
//! pushes diagnostics to it and asks it to apply workspace edits; file
//! content and file listing callbacks live behind the overlay store and are
//! not part of this trait.

use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostic;
use crate::error::Result;
use crate::rename::WorkspaceEdit;

/// Parameters of a diagnostics publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishDiagnosticsParams {
    pub uri: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// The remote client of a session.
pub trait LanguageClient {
    /// Publish the current diagnostics for a file, replacing earlier ones.
    fn publish_diagnostics(&self, params: PublishDiagnosticsParams);

    /// Ask the client to apply a workspace edit.
    fn apply_workspace_edit(&self, edit: WorkspaceEdit) -> Result<()>;
}
