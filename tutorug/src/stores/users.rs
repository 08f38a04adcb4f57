//! Learner contact details
//!
//! Notifications look contacts up through [`ContactDirectory`]; onboarding
//! writes them through [`UserProfiles`].

use async_trait::async_trait;
use bson::{doc, DateTime};

use notify::{Contact, ContactDirectory, InMemoryContacts, NotifyError};
use tutorug_core::UserId;

use crate::db::schemas::{UserDoc, USER_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::{Result, TutorugError};

#[async_trait]
pub trait UserProfiles: Send + Sync {
    /// Create or replace the contact details for `user`.
    async fn upsert_contact(&self, user: &UserId, contact: Contact) -> Result<()>;
}

#[async_trait]
impl UserProfiles for InMemoryContacts {
    async fn upsert_contact(&self, user: &UserId, contact: Contact) -> Result<()> {
        self.insert(user.clone(), contact).await;
        Ok(())
    }
}

pub struct MongoUserDirectory {
    collection: MongoCollection<UserDoc>,
}

impl MongoUserDirectory {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let collection = mongo.collection::<UserDoc>(USER_COLLECTION).await?;
        Ok(Self { collection })
    }
}

#[async_trait]
impl ContactDirectory for MongoUserDirectory {
    async fn contact(&self, user_id: &UserId) -> std::result::Result<Option<Contact>, NotifyError> {
        let found = self
            .collection
            .find_one(doc! { "user_id": user_id.as_str() })
            .await
            .map_err(|e| NotifyError::Directory(e.to_string()))?;
        Ok(found.map(|doc| doc.contact()))
    }
}

#[async_trait]
impl UserProfiles for MongoUserDirectory {
    async fn upsert_contact(&self, user: &UserId, contact: Contact) -> Result<()> {
        let now = DateTime::now();
        self.collection
            .inner()
            .update_one(
                doc! { "user_id": user.as_str() },
                doc! {
                    "$set": {
                        "first_name": contact.first_name.as_str(),
                        "phone": contact.phone.as_deref(),
                        "email": contact.email.as_deref(),
                        "metadata.updated_at": now,
                    },
                    "$setOnInsert": { "metadata.created_at": now },
                },
            )
            .upsert(true)
            .await
            .map_err(TutorugError::from)?;
        Ok(())
    }
}
