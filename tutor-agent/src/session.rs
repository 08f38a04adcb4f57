//! Chat sessions and their storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use tutorug_core::UserId;

use crate::backend::MessageRole;
use crate::error::{ChatError, Result};
use crate::prompts::{SessionKind, TutorContext};

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    /// Tokens billed for producing this message (assistant turns only)
    pub tokens_used: u32,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tokens_used: 0,
            model: None,
            created_at: at,
        }
    }

    pub fn assistant(
        content: impl Into<String>,
        tokens_used: u32,
        model: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tokens_used,
            model: Some(model.into()),
            created_at: at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub user_id: UserId,
    pub kind: SessionKind,
    pub title: String,
    pub context: TutorContext,
    pub messages: Vec<ChatMessage>,
    pub total_tokens: u64,
    pub is_active: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// 1-5 stars, given when the session is ended
    pub rating: Option<u8>,
}

impl ChatSession {
    pub fn new(
        user_id: UserId,
        kind: SessionKind,
        title: String,
        context: TutorContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            kind,
            title,
            context,
            messages: Vec::new(),
            total_tokens: 0,
            is_active: true,
            started_at: now,
            ended_at: None,
            rating: None,
        }
    }

    /// Last `limit` messages, oldest first.
    pub fn recent(&self, limit: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }
}

/// Short listing entry, without the message bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub kind: SessionKind,
    pub title: String,
    pub total_messages: usize,
    pub total_tokens: u64,
    pub is_active: bool,
    pub started_at: DateTime<Utc>,
}

impl From<&ChatSession> for SessionSummary {
    fn from(session: &ChatSession) -> Self {
        Self {
            id: session.id.clone(),
            kind: session.kind,
            title: session.title.clone(),
            total_messages: session.messages.len(),
            total_tokens: session.total_tokens,
            is_active: session.is_active,
            started_at: session.started_at,
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: ChatSession) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<ChatSession>>;

    /// Append messages to an active session and add `tokens` to its total.
    async fn append(&self, id: &str, messages: Vec<ChatMessage>, tokens: u64) -> Result<()>;

    /// Mark the session ended. Ending twice keeps the first end time.
    async fn end(&self, id: &str, at: DateTime<Utc>, rating: Option<u8>) -> Result<ChatSession>;

    /// User's sessions, newest first.
    async fn list_for(&self, user: &UserId, active_only: bool) -> Result<Vec<ChatSession>>;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, ChatSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: ChatSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(ChatError::Store(format!("duplicate session {}", session.id)));
        }
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ChatSession>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn append(&self, id: &str, messages: Vec<ChatMessage>, tokens: u64) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| ChatError::SessionNotFound(id.to_string()))?;
        if !session.is_active {
            return Err(ChatError::SessionEnded(id.to_string()));
        }
        session.messages.extend(messages);
        session.total_tokens += tokens;
        Ok(())
    }

    async fn end(&self, id: &str, at: DateTime<Utc>, rating: Option<u8>) -> Result<ChatSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| ChatError::SessionNotFound(id.to_string()))?;
        if session.is_active {
            session.is_active = false;
            session.ended_at = Some(at);
        }
        if rating.is_some() {
            session.rating = rating;
        }
        Ok(session.clone())
    }

    async fn list_for(&self, user: &UserId, active_only: bool) -> Result<Vec<ChatSession>> {
        let sessions = self.sessions.read().await;
        let mut found: Vec<ChatSession> = sessions
            .values()
            .filter(|s| &s.user_id == user && (!active_only || s.is_active))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
    }

    fn session() -> ChatSession {
        ChatSession::new(
            UserId::parse("student-1").unwrap(),
            SessionKind::Learning,
            "AI Tutor Session".into(),
            TutorContext::default(),
            now(),
        )
    }

    #[tokio::test]
    async fn test_append_and_recent() {
        let store = InMemorySessionStore::new();
        let s = session();
        let id = s.id.clone();
        store.create(s).await.unwrap();

        for i in 0..6 {
            store
                .append(&id, vec![ChatMessage::user(format!("q{i}"), now())], 2)
                .await
                .unwrap();
        }

        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.total_tokens, 12);
        let recent: Vec<&str> = stored.recent(2).iter().map(|m| m.content.as_str()).collect();
        assert_eq!(recent, vec!["q4", "q5"]);
        assert_eq!(stored.recent(50).len(), 6);
    }

    #[tokio::test]
    async fn test_ended_session_rejects_messages() {
        let store = InMemorySessionStore::new();
        let s = session();
        let id = s.id.clone();
        store.create(s).await.unwrap();

        let ended = store.end(&id, now(), Some(5)).await.unwrap();
        assert!(!ended.is_active);
        assert_eq!(ended.rating, Some(5));

        let err = store
            .append(&id, vec![ChatMessage::user("late", now())], 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::SessionEnded(_)));
    }

    #[tokio::test]
    async fn test_list_for_filters_by_user() {
        let store = InMemorySessionStore::new();
        let mine = session();
        let other = ChatSession::new(
            UserId::parse("student-2").unwrap(),
            SessionKind::Homework,
            "Homework Help".into(),
            TutorContext::default(),
            now(),
        );
        store.create(mine.clone()).await.unwrap();
        store.create(other).await.unwrap();

        let listed = store.list_for(&mine.user_id, true).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, mine.id);
    }
}
