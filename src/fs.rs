//! Contract of the overlay file store.
//!
//! The workspace's files live in an in-memory overlay that is filled lazily:
//! `ensure` materializes a single file from wherever the truth lives (local
//! disk or the remote client), `ensure_structure` materializes the directory
//! listing without contents. Both are idempotent — calling them again for
//! already-materialized state is free.

use crate::error::Result;

/// In-memory overlay file store plus its lazy-fetch updater.
pub trait OverlayStore {
    /// Materialize the content of `uri`. Idempotent.
    fn ensure(&self, uri: &str) -> Result<()>;

    /// Materialize the workspace file listing (URIs only). Idempotent.
    fn ensure_structure(&self) -> Result<()>;

    /// Content of a materialized file.
    fn content(&self, uri: &str) -> Result<String>;

    /// All URIs known to the workspace, materialized or not.
    fn uris(&self) -> Vec<String>;
}
