//! Email delivery through SendGrid.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::NotifyError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendGridConfig {
    pub api_key: String,
    pub from_email: String,
    pub from_name: String,
    pub base_url: String,
    pub timeout_ms: u64,
}

impl SendGridConfig {
    pub fn new(api_key: impl Into<String>, from_email: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            from_email: from_email.into(),
            from_name: "TutorUG".to_string(),
            base_url: "https://api.sendgrid.com/v3".to_string(),
            timeout_ms: 10_000,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

pub struct SendGridEmail {
    client: Client,
    config: SendGridConfig,
}

impl SendGridEmail {
    pub fn new(config: SendGridConfig) -> Result<Self, NotifyError> {
        if config.api_key.is_empty() {
            return Err(NotifyError::Config("SendGrid API key is empty".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| NotifyError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }
}

#[derive(Serialize)]
struct MailSend<'a> {
    personalizations: [Personalization<'a>; 1],
    from: Address<'a>,
    subject: &'a str,
    content: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: [Address<'a>; 1],
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

#[async_trait]
impl EmailSender for SendGridEmail {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        let body = MailSend {
            personalizations: [Personalization {
                to: [Address {
                    email: &message.to,
                    name: None,
                }],
            }],
            from: Address {
                email: &self.config.from_email,
                name: Some(&self.config.from_name),
            },
            subject: &message.subject,
            content: [Content {
                content_type: "text/plain",
                value: &message.text,
            }],
        };

        let response = self
            .client
            .post(format!("{}/mail/send", self.config.base_url.trim_end_matches('/')))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .json(&body)
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

        debug!(to = %message.to, subject = %message.subject, "Email accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> EmailMessage {
        EmailMessage {
            to: "learner@example.com".into(),
            subject: "Hi".into(),
            text: "Body".into(),
        }
    }

    #[tokio::test]
    async fn test_send_email_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mail/send"))
            .and(header("authorization", "Bearer sg-key"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let sender = SendGridEmail::new(
            SendGridConfig::new("sg-key", "noreply@tutoruganda.com").with_base_url(server.uri()),
        )
        .unwrap();
        sender.send_email(&message()).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_email_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad"))
            .mount(&server)
            .await;

        let sender = SendGridEmail::new(
            SendGridConfig::new("sg-key", "noreply@tutoruganda.com").with_base_url(server.uri()),
        )
        .unwrap();
        assert!(sender.send_email(&message()).await.is_err());
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(SendGridEmail::new(SendGridConfig::new("", "a@b.c")).is_err());
    }
}
