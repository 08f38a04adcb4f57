//! Store-level primitives shared by every persistence backend.

use serde::{Deserialize, Serialize};

/// A record together with the version it was read at.
///
/// Writers pass the version back to the store; a mismatch means another
/// writer got there first and the read-modify-write must be replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: u64) -> Self {
        Self { value, version }
    }
}

/// Errors surfaced by store implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Optimistic version check failed (lost update prevented)
    #[error("version conflict on {key}")]
    Conflict { key: String },

    /// A conditional write found the target in an unexpected state
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Record does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Backend unavailable or returned an error
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether the caller may retry the whole operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Backend(_))
    }
}
