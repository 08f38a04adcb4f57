//! Error types for the TutorUG service

use hyper::StatusCode;

use reputation::ReputationError;
use subscription::SubscriptionError;
use tutor_agent::ChatError;
use tutorug_core::{InvalidUserId, StoreError};

/// Main error type for request handling
#[derive(Debug, thiserror::Error)]
pub enum TutorugError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Missing or invalid credentials
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Authenticated, but no trial or paid period covers now
    #[error("An active subscription is required")]
    SubscriptionRequired,

    /// Resource belongs to another user
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Concurrent updates kept colliding
    #[error("Concurrent update conflict: {0}")]
    ConcurrencyConflict(String),

    /// LLM, payment, SMS or email provider failed or timed out
    #[error("External service failure: {message}")]
    ExternalService { message: String, retryable: bool },

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TutorugError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::SubscriptionRequired => StatusCode::FORBIDDEN,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ConcurrencyConflict(_) => StatusCode::CONFLICT,
            Self::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::SubscriptionRequired => "SUBSCRIPTION_REQUIRED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            Self::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_FAILURE",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Config(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the client may retry the same request later
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConcurrencyConflict(_) | Self::Unavailable(_) | Self::Database(_) => true,
            Self::ExternalService { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// JSON body sent to clients
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
            "retryable": self.is_retryable(),
        })
    }
}

impl From<std::io::Error> for TutorugError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for TutorugError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidInput(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for TutorugError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<mongodb::error::Error> for TutorugError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for TutorugError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthenticated(format!("JWT error: {}", err))
    }
}

impl From<InvalidUserId> for TutorugError {
    fn from(err: InvalidUserId) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl From<StoreError> for TutorugError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { key } => Self::ConcurrencyConflict(key),
            StoreError::PreconditionFailed(m) => Self::InvalidInput(m),
            StoreError::NotFound(m) => Self::NotFound(m),
            StoreError::Backend(m) => Self::Database(m),
        }
    }
}

impl From<SubscriptionError> for TutorugError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::InvalidInput(m) => Self::InvalidInput(m),
            SubscriptionError::NotFound(user) => {
                Self::NotFound(format!("no subscription for user {}", user))
            }
            SubscriptionError::PaymentNotFound(tx_ref) => {
                Self::NotFound(format!("payment {}", tx_ref))
            }
            e @ SubscriptionError::InvalidTransition { .. } => Self::InvalidInput(e.to_string()),
            SubscriptionError::InvalidSignature => {
                Self::Unauthenticated("invalid webhook signature".into())
            }
            SubscriptionError::WebhookNotConfigured => {
                Self::Unavailable("payment webhooks are not configured".into())
            }
            SubscriptionError::Gateway(e) => Self::ExternalService {
                retryable: e.is_retryable(),
                message: format!("payment gateway: {}", e),
            },
            e @ SubscriptionError::ConcurrencyConflict { .. } => {
                Self::ConcurrencyConflict(e.to_string())
            }
            SubscriptionError::Store(e) => e.into(),
        }
    }
}

impl From<ReputationError> for TutorugError {
    fn from(err: ReputationError) -> Self {
        match err {
            e @ (ReputationError::InvalidAmount(_) | ReputationError::InvalidInput(_)) => {
                Self::InvalidInput(e.to_string())
            }
            e @ ReputationError::ConcurrencyConflict { .. } => {
                Self::ConcurrencyConflict(e.to_string())
            }
            ReputationError::Config(m) => Self::Config(m),
            ReputationError::Activity(m) => Self::Unavailable(format!("activity log: {}", m)),
            ReputationError::Store(e) => e.into(),
        }
    }
}

impl From<ChatError> for TutorugError {
    fn from(err: ChatError) -> Self {
        match err {
            e @ (ChatError::InvalidInput(_)
            | ChatError::SessionEnded(_)
            | ChatError::ContentFlagged { .. }) => Self::InvalidInput(e.to_string()),
            ChatError::SessionNotFound(id) => Self::NotFound(format!("chat session {}", id)),
            e @ ChatError::NotOwner(_) => Self::Forbidden(e.to_string()),
            e @ ChatError::Timeout(_) => Self::ExternalService {
                message: e.to_string(),
                retryable: true,
            },
            ChatError::Llm(e) => Self::ExternalService {
                retryable: e.is_retryable(),
                message: format!("AI tutor: {}", e),
            },
            ChatError::Store(m) => Self::Database(m),
        }
    }
}

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, TutorugError>;

#[cfg(test)]
mod tests {
    use super::*;
    use subscription::GatewayError;

    #[test]
    fn test_gate_errors_map_to_401_and_403() {
        assert_eq!(
            TutorugError::Unauthenticated("no token".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            TutorugError::SubscriptionRequired.status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_gateway_timeout_is_retryable_external_failure() {
        let err: TutorugError =
            SubscriptionError::Gateway(GatewayError::Network("timed out".into())).into();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(err.is_retryable());
        assert_eq!(err.to_json()["error"], "EXTERNAL_SERVICE_FAILURE");
    }

    #[test]
    fn test_chat_timeout_is_retryable() {
        let err: TutorugError = ChatError::Timeout(30_000).into();
        assert!(err.is_retryable());

        let err: TutorugError = ChatError::NotOwner("abc".into()).into();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_store_conflict_maps_to_409() {
        let err: TutorugError = StoreError::Conflict { key: "u1".into() }.into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(err.is_retryable());
    }
}
