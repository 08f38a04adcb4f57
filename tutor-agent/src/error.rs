//! Error types for tutor chat.

use tutorug_core::InvalidUserId;

use crate::backend::LlmError;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("chat session not found: {0}")]
    SessionNotFound(String),

    /// Session exists but belongs to someone else
    #[error("chat session {0} belongs to another user")]
    NotOwner(String),

    #[error("chat session {0} has ended")]
    SessionEnded(String),

    /// Message rejected by moderation
    #[error("message contains inappropriate content")]
    ContentFlagged { categories: Vec<String> },

    /// LLM call exceeded the configured deadline
    #[error("tutor did not respond within {0}ms")]
    Timeout(u64),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("session store error: {0}")]
    Store(String),
}

impl ChatError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Store(_) => true,
            Self::Llm(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<InvalidUserId> for ChatError {
    fn from(err: InvalidUserId) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
