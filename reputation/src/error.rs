//! Error types for reputation operations.

use tutorug_core::{InvalidUserId, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ReputationError {
    /// Award amount must be a positive integer
    #[error("invalid amount: {0} (must be > 0)")]
    InvalidAmount(i64),

    /// Malformed input (identifiers, scores)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Optimistic version check kept failing
    #[error("concurrent update conflict for user {user_id} after {attempts} attempts")]
    ConcurrencyConflict { user_id: String, attempts: u32 },

    /// Points configuration rejected
    #[error("configuration error: {0}")]
    Config(String),

    /// Activity log unavailable
    #[error("activity source error: {0}")]
    Activity(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ReputationError {
    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConcurrencyConflict { .. } | Self::Activity(_) => true,
            Self::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<InvalidUserId> for ReputationError {
    fn from(err: InvalidUserId) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReputationError>;
