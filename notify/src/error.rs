//! Error types for notification delivery.

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Provider could not be reached (includes timeouts)
    #[error("network error: {0}")]
    Network(String),

    /// Provider answered with an error
    #[error("provider rejected message ({status}): {body}")]
    Provider { status: u16, body: String },

    /// Response body could not be understood
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Contact directory lookup failed
    #[error("contact lookup failed: {0}")]
    Directory(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}
