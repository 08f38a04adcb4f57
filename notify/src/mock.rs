//! In-memory notification doubles for tests and dev mode.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tutorug_core::UserId;

use crate::dispatcher::{Contact, ContactDirectory, DeliveryReport, NotificationSink};
use crate::error::NotifyError;
use crate::template::Notification;

/// Sink that records every notification instead of sending it.
#[derive(Default)]
pub struct RecordingSink {
    sent: RwLock<Vec<(UserId, Notification)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<(UserId, Notification)> {
        self.sent.read().await.clone()
    }

    /// Notifications sent to one user, in order.
    pub async fn sent_to(&self, user_id: &UserId) -> Vec<Notification> {
        self.sent
            .read()
            .await
            .iter()
            .filter(|(u, _)| u == user_id)
            .map(|(_, n)| n.clone())
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.sent.read().await.len()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, user_id: &UserId, notification: Notification) -> DeliveryReport {
        self.sent.write().await.push((user_id.clone(), notification));
        DeliveryReport::skipped()
    }
}

#[derive(Default)]
pub struct InMemoryContacts {
    contacts: RwLock<HashMap<UserId, Contact>>,
}

impl InMemoryContacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user_id: UserId, contact: Contact) {
        self.contacts.write().await.insert(user_id, contact);
    }
}

#[async_trait]
impl ContactDirectory for InMemoryContacts {
    async fn contact(&self, user_id: &UserId) -> Result<Option<Contact>, NotifyError> {
        Ok(self.contacts.read().await.get(user_id).cloned())
    }
}
