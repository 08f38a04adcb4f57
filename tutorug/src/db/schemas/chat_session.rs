//! Chat session document schema

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use tutor_agent::{ChatError, ChatMessage, ChatSession, SessionKind, TutorContext};
use tutorug_core::UserId;

use super::{opt_to_bson, opt_to_chrono, to_bson, Metadata};
use crate::db::mongo::{IntoIndexes, MutMetadata};

pub const CHAT_SESSION_COLLECTION: &str = "chat_sessions";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatSessionDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub session_id: String,
    pub user_id: String,
    pub kind: SessionKind,
    pub title: String,

    #[serde(default)]
    pub context: TutorContext,

    /// Whole conversation, oldest first
    #[serde(default)]
    pub messages: Vec<ChatMessage>,

    pub total_tokens: i64,
    pub is_active: bool,
    pub started_at: DateTime,

    #[serde(default)]
    pub ended_at: Option<DateTime>,

    #[serde(default)]
    pub rating: Option<i32>,
}

impl ChatSessionDoc {
    pub fn from_session(session: &ChatSession) -> Self {
        Self {
            _id: None,
            metadata: Metadata::stamped(session.started_at, session.started_at),
            session_id: session.id.clone(),
            user_id: session.user_id.to_string(),
            kind: session.kind,
            title: session.title.clone(),
            context: session.context.clone(),
            messages: session.messages.clone(),
            total_tokens: i64::try_from(session.total_tokens).unwrap_or(i64::MAX),
            is_active: session.is_active,
            started_at: to_bson(session.started_at),
            ended_at: opt_to_bson(session.ended_at),
            rating: session.rating.map(i32::from),
        }
    }

    pub fn to_session(&self) -> Result<ChatSession, ChatError> {
        let corrupt = |detail: String| {
            ChatError::Store(format!("corrupt chat session {}: {}", self.session_id, detail))
        };
        Ok(ChatSession {
            id: self.session_id.clone(),
            user_id: UserId::parse(self.user_id.as_str()).map_err(|e| corrupt(e.to_string()))?,
            kind: self.kind,
            title: self.title.clone(),
            context: self.context.clone(),
            messages: self.messages.clone(),
            total_tokens: u64::try_from(self.total_tokens).map_err(|e| corrupt(e.to_string()))?,
            is_active: self.is_active,
            started_at: self.started_at.to_chrono(),
            ended_at: opt_to_chrono(self.ended_at),
            rating: self
                .rating
                .map(u8::try_from)
                .transpose()
                .map_err(|e| corrupt(e.to_string()))?,
        })
    }
}

impl IntoIndexes for ChatSessionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "session_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("session_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "user_id": 1, "started_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("user_sessions_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ChatSessionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
