//! Error types for subscription and billing operations.

use tutorug_core::{InvalidUserId, StoreError};

use crate::gateway::GatewayError;
use crate::types::SubscriptionStatus;

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// Malformed identifiers, unknown plans, unparsable payloads
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no subscription for user {0}")]
    NotFound(String),

    #[error("payment not found: {0}")]
    PaymentNotFound(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },

    /// Webhook signature missing or wrong
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// No webhook secret configured; webhooks are refused
    #[error("webhook secret not configured")]
    WebhookNotConfigured,

    /// Payment gateway unreachable or erroring
    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Optimistic version check kept failing
    #[error("concurrent update conflict for user {user_id} after {attempts} attempts")]
    ConcurrencyConflict { user_id: String, attempts: u32 },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SubscriptionError {
    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConcurrencyConflict { .. } => true,
            Self::Gateway(e) => e.is_retryable(),
            Self::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<InvalidUserId> for SubscriptionError {
    fn from(err: InvalidUserId) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SubscriptionError>;
