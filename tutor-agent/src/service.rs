//! TutorService - moderated AI tutor chat.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use reputation::ReputationEngine;
use tutorug_core::{Clock, UserId};

use crate::backend::{CompletionRequest, LlmBackend, LlmError, Message};
use crate::error::{ChatError, Result};
use crate::prompts::{default_title, system_prompt, SessionKind, TutorContext};
use crate::session::{ChatMessage, ChatSession, SessionStore, SessionSummary};

/// Reply sent instead of a tutor answer that failed moderation.
pub const FLAGGED_REPLY_FALLBACK: &str = "I apologize, but I need to provide a more appropriate \
response. Could you please rephrase your question about the academic topic?";

/// Reason recorded with chat point awards.
pub const AI_CHAT_MESSAGE: &str = "AI_CHAT_MESSAGE";

#[derive(Debug, Clone)]
pub struct TutorConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Prior messages sent along as conversation history
    pub history_limit: usize,
    /// Deadline for each LLM call (moderation and completion)
    pub timeout: Duration,
    pub max_message_chars: usize,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: 0.7,
            history_limit: 10,
            timeout: Duration::from_secs(30),
            max_message_chars: 2000,
        }
    }
}

/// Result of one question to the tutor.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorReply {
    pub session_id: String,
    pub message: ChatMessage,
    /// True when the model's answer was replaced after moderation
    pub moderated: bool,
    pub points_awarded: u64,
}

pub struct TutorService {
    backend: Arc<dyn LlmBackend>,
    sessions: Arc<dyn SessionStore>,
    reputation: Option<Arc<ReputationEngine>>,
    clock: Arc<dyn Clock>,
    config: TutorConfig,
}

impl TutorService {
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        config: TutorConfig,
    ) -> Self {
        Self {
            backend,
            sessions,
            reputation: None,
            clock,
            config,
        }
    }

    /// Award chat points through this engine.
    pub fn with_reputation(mut self, engine: Arc<ReputationEngine>) -> Self {
        self.reputation = Some(engine);
        self
    }

    pub fn backend(&self) -> &Arc<dyn LlmBackend> {
        &self.backend
    }

    pub async fn start_session(
        &self,
        user: &UserId,
        kind: SessionKind,
        title: Option<String>,
        context: TutorContext,
    ) -> Result<ChatSession> {
        let title = match title.map(|t| t.trim().to_string()) {
            Some(t) if !t.is_empty() => t,
            _ => default_title(kind, &context),
        };
        let session = ChatSession::new(user.clone(), kind, title, context, self.clock.now());
        self.sessions.create(session.clone()).await?;
        info!(user_id = %user, session_id = %session.id, kind = ?kind, "Chat session started");
        Ok(session)
    }

    /// Ask the tutor a question inside an existing session.
    ///
    /// The message is moderated before any completion is requested; flagged
    /// input is refused and earns nothing. Nothing is stored and no points
    /// are awarded unless the whole exchange succeeds.
    pub async fn ask(&self, user: &UserId, session_id: &str, message: &str) -> Result<TutorReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::InvalidInput("message is required".into()));
        }
        if message.chars().count() > self.config.max_message_chars {
            return Err(ChatError::InvalidInput(format!(
                "message exceeds {} characters",
                self.config.max_message_chars
            )));
        }

        let session = self.owned_session(user, session_id).await?;
        if !session.is_active {
            return Err(ChatError::SessionEnded(session_id.to_string()));
        }

        let verdict = self.bounded(self.backend.moderate(message)).await?;
        if verdict.flagged {
            warn!(
                user_id = %user,
                session_id,
                categories = ?verdict.categories,
                "Chat message refused by moderation"
            );
            return Err(ChatError::ContentFlagged {
                categories: verdict.categories,
            });
        }

        let capabilities = self.backend.capabilities();
        let max_tokens = self.config.max_tokens.min(capabilities.max_output_tokens);
        let prompt = system_prompt(session.kind, &session.context);
        let budget = capabilities
            .context_window
            .saturating_sub(max_tokens)
            .saturating_sub(estimate_tokens(&prompt))
            .saturating_sub(estimate_tokens(message));
        let history = fit_history(session.recent(self.config.history_limit), budget);

        let mut request = CompletionRequest {
            system_prompt: Some(prompt),
            messages: Vec::new(),
            max_tokens: Some(max_tokens),
            temperature: None,
        }
        .with_temperature(self.config.temperature);
        for prior in history {
            request = request.with_message(Message {
                role: prior.role,
                content: prior.content.clone(),
            });
        }
        request = request.with_message(Message::user(message));

        let response = self.bounded(self.backend.complete(request)).await?;
        let tokens = response.usage.total();

        let reply_verdict = self.bounded(self.backend.moderate(&response.content)).await?;
        let moderated = reply_verdict.flagged;
        let content = if moderated {
            warn!(session_id, model = %response.model, "Tutor reply replaced after moderation");
            FLAGGED_REPLY_FALLBACK.to_string()
        } else {
            response.content
        };

        let now = self.clock.now();
        let reply = ChatMessage::assistant(content, tokens, response.model, now);
        self.sessions
            .append(
                session_id,
                vec![ChatMessage::user(message, now), reply.clone()],
                u64::from(tokens),
            )
            .await?;

        let points_awarded = self.award_chat_points(user).await;
        debug!(user_id = %user, session_id, tokens, points_awarded, "Tutor replied");

        Ok(TutorReply {
            session_id: session_id.to_string(),
            message: reply,
            moderated,
            points_awarded,
        })
    }

    /// Full conversation for one of the user's sessions.
    pub async fn history(&self, user: &UserId, session_id: &str) -> Result<ChatSession> {
        self.owned_session(user, session_id).await
    }

    pub async fn end_session(
        &self,
        user: &UserId,
        session_id: &str,
        rating: Option<u8>,
    ) -> Result<ChatSession> {
        if let Some(r) = rating {
            if !(1..=5).contains(&r) {
                return Err(ChatError::InvalidInput(format!(
                    "rating must be 1-5, got {r}"
                )));
            }
        }
        self.owned_session(user, session_id).await?;
        let session = self
            .sessions
            .end(session_id, self.clock.now(), rating)
            .await?;
        info!(user_id = %user, session_id, rating = ?rating, "Chat session ended");
        Ok(session)
    }

    pub async fn sessions(&self, user: &UserId, active_only: bool) -> Result<Vec<SessionSummary>> {
        Ok(self
            .sessions
            .list_for(user, active_only)
            .await?
            .iter()
            .map(SessionSummary::from)
            .collect())
    }

    async fn owned_session(&self, user: &UserId, session_id: &str) -> Result<ChatSession> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| ChatError::SessionNotFound(session_id.to_string()))?;
        if &session.user_id != user {
            return Err(ChatError::NotOwner(session_id.to_string()));
        }
        Ok(session)
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T>
    where
        F: std::future::Future<Output = std::result::Result<T, LlmError>>,
    {
        match tokio::time::timeout(self.config.timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ChatError::Timeout(self.config.timeout.as_millis() as u64)),
        }
    }

    /// Streak and point update for one answered message. Failures are logged
    /// and never fail the chat.
    async fn award_chat_points(&self, user: &UserId) -> u64 {
        let Some(engine) = &self.reputation else {
            return 0;
        };

        if let Err(e) = engine.update_streak(user).await {
            warn!(user_id = %user, error = %e, "Streak update after chat failed");
        }

        let amount = engine.config().points.ai_chat_message as i64;
        match engine.award_points(user, amount, AI_CHAT_MESSAGE).await {
            Ok(award) => award.points_added + award.bonus_points,
            Err(e) => {
                warn!(user_id = %user, error = %e, "Chat point award failed");
                0
            }
        }
    }
}

/// Rough token count, about four characters per token.
fn estimate_tokens(text: &str) -> u32 {
    let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
    chars.div_ceil(4)
}

/// Newest suffix of `messages` whose estimated size fits `budget`.
fn fit_history(messages: &[ChatMessage], budget: u32) -> &[ChatMessage] {
    let mut used = 0u32;
    let mut start = messages.len();
    for (i, message) in messages.iter().enumerate().rev() {
        used = used.saturating_add(estimate_tokens(&message.content));
        if used > budget {
            break;
        }
        start = i;
    }
    &messages[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_fit_history_keeps_newest() {
        let now = Utc::now();
        let messages = vec![
            ChatMessage::user("a".repeat(40), now),
            ChatMessage::user("b".repeat(40), now),
            ChatMessage::user("c".repeat(40), now),
        ];
        let kept = fit_history(&messages, 25);
        assert_eq!(kept.len(), 2);
        assert!(kept[0].content.starts_with('b'));
        assert!(fit_history(&messages, 0).is_empty());
        assert_eq!(fit_history(&messages, 1000).len(), 3);
    }
}
