//! Store error types.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// An object with the same identity already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Version mismatch (optimistic concurrency control); the caller must
    /// re-fetch and retry.
    #[error("conflict: expected version {expected}, got {actual}")]
    Conflict { expected: u64, actual: u64 },

    /// Internal error.
    #[error("internal: {0}")]
    Internal(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
