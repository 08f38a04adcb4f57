//! SMS delivery through Africa's Talking.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::NotifyError;
use crate::phone::format_ug_phone;

#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Send `message` to a single recipient.
    async fn send_sms(&self, to: &str, message: &str) -> Result<SmsReceipt, NotifyError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsReceipt {
    pub message_id: Option<String>,
    pub cost: Option<String>,
}

/// Africa's Talking account settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AfricasTalkingConfig {
    pub username: String,
    pub api_key: String,
    /// Registered alphanumeric sender id
    pub sender_id: Option<String>,
    pub base_url: String,
    pub timeout_ms: u64,
}

impl AfricasTalkingConfig {
    pub const LIVE_URL: &'static str = "https://api.africastalking.com/version1";
    pub const SANDBOX_URL: &'static str = "https://api.sandbox.africastalking.com/version1";

    pub fn new(username: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            api_key: api_key.into(),
            sender_id: Some("TutorUG".to_string()),
            base_url: Self::LIVE_URL.to_string(),
            timeout_ms: 10_000,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

pub struct AfricasTalkingSms {
    client: Client,
    config: AfricasTalkingConfig,
}

impl AfricasTalkingSms {
    pub fn new(config: AfricasTalkingConfig) -> Result<Self, NotifyError> {
        if config.api_key.is_empty() {
            return Err(NotifyError::Config("Africa's Talking API key is empty".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| NotifyError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn messaging_url(&self) -> String {
        format!("{}/messaging", self.config.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(rename = "SMSMessageData")]
    data: MessageData,
}

#[derive(Debug, Deserialize)]
struct MessageData {
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "Recipients", default)]
    recipients: Vec<Recipient>,
}

#[derive(Debug, Deserialize)]
struct Recipient {
    #[serde(rename = "statusCode")]
    status_code: u16,
    #[serde(default)]
    status: String,
    #[serde(default)]
    cost: Option<String>,
    #[serde(rename = "messageId", default)]
    message_id: Option<String>,
}

/// 100 Processed, 101 Sent, 102 Queued.
fn accepted(code: u16) -> bool {
    (100..=102).contains(&code)
}

#[async_trait]
impl SmsSender for AfricasTalkingSms {
    async fn send_sms(&self, to: &str, message: &str) -> Result<SmsReceipt, NotifyError> {
        let to = format_ug_phone(to)?;

        let mut form = vec![
            ("username", self.config.username.as_str()),
            ("to", to.as_str()),
            ("message", message),
        ];
        if let Some(from) = &self.config.sender_id {
            form.push(("from", from.as_str()));
        }

        let response = self
            .client
            .post(self.messaging_url())
            .header("apiKey", &self.config.api_key)
            .header(header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SendResponse = response.json().await?;
        let recipient = parsed.data.recipients.into_iter().next().ok_or_else(|| {
            NotifyError::Provider {
                status: status.as_u16(),
                body: parsed.data.message.clone(),
            }
        })?;

        if !accepted(recipient.status_code) {
            return Err(NotifyError::Provider {
                status: recipient.status_code,
                body: recipient.status,
            });
        }

        debug!(to = %to, message_id = ?recipient.message_id, "SMS accepted");
        Ok(SmsReceipt {
            message_id: recipient.message_id,
            cost: recipient.cost,
        })
    }
}
