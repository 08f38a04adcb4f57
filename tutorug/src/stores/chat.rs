//! MongoDB-backed chat session store

use async_trait::async_trait;
use bson::{doc, DateTime};
use chrono::Utc;
use mongodb::options::FindOptions;

use tutor_agent::{ChatError, ChatMessage, ChatSession, SessionStore};
use tutorug_core::{StoreError, UserId};

use crate::db::schemas::{ChatSessionDoc, CHAT_SESSION_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::TutorugError;

fn chat_store_error(err: StoreError) -> ChatError {
    ChatError::Store(err.to_string())
}

pub struct MongoSessionStore {
    collection: MongoCollection<ChatSessionDoc>,
}

impl MongoSessionStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self, TutorugError> {
        let collection = mongo
            .collection::<ChatSessionDoc>(CHAT_SESSION_COLLECTION)
            .await?;
        Ok(Self { collection })
    }

    async fn find(&self, id: &str) -> Result<Option<ChatSessionDoc>, ChatError> {
        self.collection
            .find_one(doc! { "session_id": id })
            .await
            .map_err(chat_store_error)
    }
}

#[async_trait]
impl SessionStore for MongoSessionStore {
    async fn create(&self, session: ChatSession) -> Result<(), ChatError> {
        self.collection
            .insert_one(ChatSessionDoc::from_session(&session), &session.id)
            .await
            .map_err(chat_store_error)
    }

    async fn get(&self, id: &str) -> Result<Option<ChatSession>, ChatError> {
        self.find(id)
            .await?
            .map(|doc| doc.to_session())
            .transpose()
    }

    async fn append(
        &self,
        id: &str,
        messages: Vec<ChatMessage>,
        tokens: u64,
    ) -> Result<(), ChatError> {
        let messages = bson::to_bson(&messages).map_err(|e| ChatError::Store(e.to_string()))?;
        let result = self
            .collection
            .update_one(
                doc! { "session_id": id, "is_active": true },
                doc! {
                    "$push": { "messages": { "$each": messages } },
                    "$inc": { "total_tokens": i64::try_from(tokens).unwrap_or(i64::MAX) },
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
            )
            .await
            .map_err(chat_store_error)?;

        if result.matched_count == 0 {
            return Err(match self.find(id).await? {
                Some(_) => ChatError::SessionEnded(id.to_string()),
                None => ChatError::SessionNotFound(id.to_string()),
            });
        }
        Ok(())
    }

    async fn end(
        &self,
        id: &str,
        at: chrono::DateTime<Utc>,
        rating: Option<u8>,
    ) -> Result<ChatSession, ChatError> {
        // First end time wins
        self.collection
            .update_one(
                doc! { "session_id": id, "is_active": true },
                doc! { "$set": { "is_active": false, "ended_at": DateTime::from_chrono(at) } },
            )
            .await
            .map_err(chat_store_error)?;

        if let Some(rating) = rating {
            self.collection
                .update_one(
                    doc! { "session_id": id },
                    doc! { "$set": { "rating": i32::from(rating) } },
                )
                .await
                .map_err(chat_store_error)?;
        }

        self.find(id)
            .await?
            .ok_or_else(|| ChatError::SessionNotFound(id.to_string()))?
            .to_session()
    }

    async fn list_for(&self, user: &UserId, active_only: bool) -> Result<Vec<ChatSession>, ChatError> {
        let mut filter = doc! { "user_id": user.as_str() };
        if active_only {
            filter.insert("is_active", true);
        }
        let options = FindOptions::builder()
            .sort(doc! { "started_at": -1 })
            .build();

        self.collection
            .find_many(filter, Some(options))
            .await
            .map_err(chat_store_error)?
            .iter()
            .map(ChatSessionDoc::to_session)
            .collect()
    }
}
