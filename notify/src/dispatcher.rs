//! Contact resolution and channel fan-out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use tutorug_core::UserId;

use crate::email::EmailSender;
use crate::error::NotifyError;
use crate::sms::SmsSender;
use crate::template::Notification;

/// What we know about how to reach a learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub first_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn contact(&self, user_id: &UserId) -> Result<Option<Contact>, NotifyError>;
}

/// Outcome for a single channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Delivery {
    Sent,
    Failed(String),
    /// Channel not configured or no address on file
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub sms: Delivery,
    pub email: Delivery,
}

impl DeliveryReport {
    pub fn skipped() -> Self {
        Self {
            sms: Delivery::Skipped,
            email: Delivery::Skipped,
        }
    }

    /// True when at least one channel accepted the message.
    pub fn delivered(&self) -> bool {
        self.sms == Delivery::Sent || self.email == Delivery::Sent
    }
}

/// Anything that can deliver a [`Notification`] to a user.
///
/// Implementations never fail the caller; problems are reported in the
/// returned [`DeliveryReport`].
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, user_id: &UserId, notification: Notification) -> DeliveryReport;
}

pub struct Dispatcher {
    contacts: Arc<dyn ContactDirectory>,
    sms: Option<Arc<dyn SmsSender>>,
    email: Option<Arc<dyn EmailSender>>,
}

impl Dispatcher {
    pub fn new(contacts: Arc<dyn ContactDirectory>) -> Self {
        Self {
            contacts,
            sms: None,
            email: None,
        }
    }

    pub fn with_sms(mut self, sms: Arc<dyn SmsSender>) -> Self {
        self.sms = Some(sms);
        self
    }

    pub fn with_email(mut self, email: Arc<dyn EmailSender>) -> Self {
        self.email = Some(email);
        self
    }

    async fn send_sms(&self, contact: &Contact, notification: &Notification) -> Delivery {
        let (Some(sms), Some(phone)) = (&self.sms, &contact.phone) else {
            return Delivery::Skipped;
        };
        match sms.send_sms(phone, &notification.sms_text(contact)).await {
            Ok(_) => Delivery::Sent,
            Err(e) => Delivery::Failed(e.to_string()),
        }
    }

    async fn send_email(&self, contact: &Contact, notification: &Notification) -> Delivery {
        let (Some(email), Some(address)) = (&self.email, &contact.email) else {
            return Delivery::Skipped;
        };
        match email.send_email(&notification.email(contact, address)).await {
            Ok(()) => Delivery::Sent,
            Err(e) => Delivery::Failed(e.to_string()),
        }
    }
}

#[async_trait]
impl NotificationSink for Dispatcher {
    async fn notify(&self, user_id: &UserId, notification: Notification) -> DeliveryReport {
        let template = notification.template_id();

        let contact = match self.contacts.contact(user_id).await {
            Ok(Some(contact)) => contact,
            Ok(None) => {
                debug!(user_id = %user_id, template, "No contact on file, skipping notification");
                return DeliveryReport::skipped();
            }
            Err(e) => {
                warn!(user_id = %user_id, template, error = %e, "Contact lookup failed");
                return DeliveryReport {
                    sms: Delivery::Failed(e.to_string()),
                    email: Delivery::Failed(e.to_string()),
                };
            }
        };

        let (sms, email) = tokio::join!(
            self.send_sms(&contact, &notification),
            self.send_email(&contact, &notification)
        );

        if let Delivery::Failed(reason) = &sms {
            warn!(user_id = %user_id, template, reason = %reason, "SMS delivery failed");
        }
        if let Delivery::Failed(reason) = &email {
            warn!(user_id = %user_id, template, reason = %reason, "Email delivery failed");
        }

        let report = DeliveryReport { sms, email };
        debug!(user_id = %user_id, template, delivered = report.delivered(), "Notification dispatched");
        report
    }
}
