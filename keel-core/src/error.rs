//! Reconciliation error taxonomy.

use std::fmt;

use thiserror::Error;

/// Errors an adapter or reconciler surfaces from a reconciliation pass.
///
/// A vanished object is swallowed at fetch time and a status-write conflict
/// is resolved at the write site, so neither appears here: every error an
/// adapter returns is either retryable or terminal for the current spec.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Backend unavailable, network error or timeout; the pass is retried
    /// with backoff and status is left untouched.
    #[error("transient: {0}")]
    Transient(String),

    /// Bad spec or explicit backend rejection; written to status and not
    /// retried until the spec generation changes.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl ReconcileError {
    pub fn transient(err: impl fmt::Display) -> Self {
        Self::Transient(err.to_string())
    }

    pub fn permanent(err: impl fmt::Display) -> Self {
        Self::Permanent(err.to_string())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
