//! Reputation - gamified progress tracking for TutorUG learners
//!
//! Converts discrete learning events (quiz completions, chat messages,
//! community help) into accumulated points and the state derived from them:
//! level, rank, daily streak, badges and achievements.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │            ReputationEngine              │
//! │  award_points / update_streak / ranking  │
//! └──────┬───────────────┬───────────────┬───┘
//!        │               │               │
//!        ▼               ▼               ▼
//! ┌─────────────┐ ┌─────────────┐ ┌─────────────┐
//! │ PointsConfig│ │ Reputation  │ │ ActivityLog │
//! │ (tables,    │ │ Store       │ │ (quiz       │
//! │  badges)    │ │ (versioned) │ │  attempts)  │
//! └─────────────┘ └─────────────┘ └─────────────┘
//! ```
//!
//! Every per-user update runs under a per-user lock and is committed with an
//! optimistic version check, so concurrent awards never lose points and a
//! badge is recorded at most once.

pub mod activity;
pub mod badges;
pub mod config;
pub mod engine;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;
pub mod window;

pub use activity::{ActivityCounts, ActivityLog, InMemoryActivityLog, QuizAttempt};
pub use config::{
    AchievementCriterion, AchievementRule, BadgeCriterion, BadgeRule, PointAmounts, PointsConfig,
    RankThreshold, WeeklyTargets,
};
pub use engine::ReputationEngine;
pub use error::ReputationError;
pub use store::{InMemoryReputationStore, ReputationStore};
pub use types::{
    AwardResult, LeaderboardEntry, QuizAward, Rank, ReputationRecord, StreakResult, Timeframe,
    WeeklyProgress,
};
pub use window::{month_start, week_start};
