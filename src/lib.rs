//! Request orchestration for a TypeScript source-navigation server.
//!
//! Given a position or descriptor query, this crate resolves symbol
//! definitions, computes quick-info, searches for symbols workspace-wide,
//! finds cross-file references, and applies renames — across a workspace
//! that may span a primary project and its dependencies. Results stream
//! back incrementally as JSON patch operations, rank-ordered as they are
//! produced.
//!
//! Parsing and type analysis are not done here: the analysis engine, the
//! project/configuration manager, the package-manifest manager, the
//! overlay file store, and the remote client are collaborators with fixed
//! contracts ([`engine`], [`project`], [`packages`], [`fs`], [`client`]),
//! supplied by the embedding server. The entry point is
//! [`session::Session`], one instance per connection.

pub mod client;
pub mod completions;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod fs;
pub mod hover;
pub mod packages;
pub mod patch;
pub mod position;
pub mod project;
pub mod protocol;
pub mod query;
pub mod rename;
pub mod search;
pub mod session;
pub mod symbols;
pub mod tracing_config;
pub mod uri;
pub mod workspace_references;

pub use error::{EngineError, Error, Result};
pub use patch::{PatchOp, PatchStream};
pub use session::{Session, SessionOptions};
