//! Error types for the context tree engine.
//!
//! Structural misses (unknown path, unknown layer) are reported through
//! `Option` / `Ok(false)` return values so callers can branch cheaply.
//! Everything in [`TreeError`] indicates caller error or a storage failure.

use std::io;

use thiserror::Error;

/// Errors emitted by a [`Store`](crate::store::Store) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid store payload: {0}")]
    Invalid(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Invalid(err.to_string())
    }
}

/// Errors raised by layer, tree and context operations.
#[derive(Debug, Error)]
pub enum TreeError {
    /// A node, parent or layer that must exist is missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// A path segment or mutation targets a locked or built-in layer.
    #[error("layer \"{0}\" is protected")]
    ProtectedName(String),

    /// The input failed path validation.
    #[error("invalid path \"{path}\": {reason}")]
    InvalidPath { path: String, reason: String },

    /// A recursive move would place a subtree inside itself.
    #[error("cannot move \"{from}\" into \"{to}\": destination is inside the source")]
    CycleGuard { from: String, to: String },

    /// A layer with the requested name already exists.
    #[error("layer name \"{0}\" is already taken")]
    NameConflict(String),

    /// The context is locked against URL changes.
    #[error("context is locked")]
    ContextLocked,

    /// The requested URL lies outside the context's base URL.
    #[error("url \"{url}\" is outside the base url \"{base}\"")]
    OutsideBaseUrl { url: String, base: String },

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl TreeError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        TreeError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
