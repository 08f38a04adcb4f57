//! Quiz-attempt collaborator used for achievements and weekly progress.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use tutorug_core::UserId;

use crate::error::ReputationError;

/// Aggregated quiz activity for a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCounts {
    pub completed_quizzes: u64,
    pub perfect_scores: u64,
    /// Completed since the start of the current week
    pub quizzes_this_week: u64,
}

/// A completed quiz attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    pub user_id: UserId,
    pub quiz_title: String,
    /// Percentage score, 0 to 100
    pub score: u8,
    pub passing_score: u8,
    pub completed_at: DateTime<Utc>,
}

#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn record_quiz(&self, attempt: QuizAttempt) -> Result<(), ReputationError>;

    /// Counts for `user`, with `quizzes_this_week` measured from `week_start`.
    async fn counts(
        &self,
        user: &UserId,
        week_start: DateTime<Utc>,
    ) -> Result<ActivityCounts, ReputationError>;
}

/// In-process activity log.
#[derive(Debug, Default)]
pub struct InMemoryActivityLog {
    attempts: RwLock<Vec<QuizAttempt>>,
}

impl InMemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActivityLog for InMemoryActivityLog {
    async fn record_quiz(&self, attempt: QuizAttempt) -> Result<(), ReputationError> {
        self.attempts.write().await.push(attempt);
        Ok(())
    }

    async fn counts(
        &self,
        user: &UserId,
        week_start: DateTime<Utc>,
    ) -> Result<ActivityCounts, ReputationError> {
        let attempts = self.attempts.read().await;
        let mut counts = ActivityCounts::default();
        for a in attempts.iter().filter(|a| &a.user_id == user) {
            counts.completed_quizzes += 1;
            if a.score == 100 {
                counts.perfect_scores += 1;
            }
            if a.completed_at >= week_start {
                counts.quizzes_this_week += 1;
            }
        }
        Ok(counts)
    }
}
