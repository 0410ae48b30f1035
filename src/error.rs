//! Error taxonomy for navigation requests.
//!
//! Requests fail in a small number of well-defined ways; everything else is
//! handled locally (per-item scan failures are logged and skipped, manifest
//! lookup failures degrade to "package unknown"). No request is retried by
//! this crate — retry policy belongs to the caller.

use thiserror::Error;

/// Errors surfaced to the caller of a request method.
#[derive(Debug, Error)]
pub enum Error {
    /// A required file or configuration was missing or in an unexpected
    /// state. Surfaced as a request failure, never retried.
    #[error("{0}")]
    Precondition(String),

    /// The operation was invoked in a context that forbids it, e.g.
    /// workspace/xreferences on a DefinitelyTyped workspace.
    #[error("{0}")]
    Unsupported(String),

    /// The symbol at the requested position cannot be renamed, or the new
    /// name is not acceptable.
    #[error("{0}")]
    Rename(String),

    /// The analysis engine reported a failure that could not be contained
    /// to a single scan item.
    #[error("analysis engine error: {0}")]
    Engine(#[from] EngineError),

    /// A file could not be materialized or read from the overlay store.
    #[error("file system error for {uri}: {message}")]
    FileSystem { uri: String, message: String },
}

/// Failure reported by the analysis engine for a single call.
///
/// The engine may fail on malformed positions; bulk scans catch this per
/// item, other call sites propagate it.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a precondition failure.
    pub fn precondition(message: impl Into<String>) -> Self {
        Error::Precondition(message.into())
    }

    /// Shorthand for an unsupported-operation failure.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::Unsupported(message.into())
    }
}
