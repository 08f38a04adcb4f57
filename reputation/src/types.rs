//! Reputation records and operation results.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use tutorug_core::UserId;

use crate::window::{month_start, week_start};

/// Coarse tier derived from total points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Learner,
    Helper,
    Tutor,
    Expert,
    Master,
}

impl Rank {
    pub const ALL: [Rank; 5] = [
        Rank::Learner,
        Rank::Helper,
        Rank::Tutor,
        Rank::Expert,
        Rank::Master,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Learner => "learner",
            Rank::Helper => "helper",
            Rank::Tutor => "tutor",
            Rank::Expert => "expert",
            Rank::Master => "master",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rank {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rank::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown rank: {s}"))
    }
}

/// Persistent per-user reputation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub user_id: UserId,
    pub total_points: u64,
    pub weekly_points: u64,
    pub monthly_points: u64,
    /// 1-based level, always derived from `total_points`
    pub current_level: u32,
    pub rank: Rank,
    pub streak_days: u32,
    pub longest_streak: u32,
    /// UTC day the streak was last counted
    pub last_streak_on: Option<NaiveDate>,
    pub badges_earned: BTreeSet<String>,
    pub achievements_unlocked: BTreeSet<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub week_window_start: DateTime<Utc>,
    pub month_window_start: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ReputationRecord {
    /// Fresh record with empty counters and windows anchored at `now`.
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            total_points: 0,
            weekly_points: 0,
            monthly_points: 0,
            current_level: 1,
            rank: Rank::Learner,
            streak_days: 0,
            longest_streak: 0,
            last_streak_on: None,
            badges_earned: BTreeSet::new(),
            achievements_unlocked: BTreeSet::new(),
            last_activity_at: None,
            week_window_start: week_start(now),
            month_window_start: month_start(now),
            created_at: now,
        }
    }

    /// Zero the weekly/monthly counters whose window has elapsed.
    ///
    /// Returns `(weekly_rolled, monthly_rolled)`.
    pub fn roll_windows(&mut self, now: DateTime<Utc>) -> (bool, bool) {
        let week = week_start(now);
        let month = month_start(now);

        let weekly = self.week_window_start < week;
        if weekly {
            self.weekly_points = 0;
            self.week_window_start = week;
        }

        let monthly = self.month_window_start < month;
        if monthly {
            self.monthly_points = 0;
            self.month_window_start = month;
        }

        (weekly, monthly)
    }

    /// Weekly points as of `now`, without mutating the record.
    pub fn weekly_points_at(&self, now: DateTime<Utc>) -> u64 {
        if self.week_window_start < week_start(now) {
            0
        } else {
            self.weekly_points
        }
    }

    /// Monthly points as of `now`, without mutating the record.
    pub fn monthly_points_at(&self, now: DateTime<Utc>) -> u64 {
        if self.month_window_start < month_start(now) {
            0
        } else {
            self.monthly_points
        }
    }
}

/// Outcome of [`crate::ReputationEngine::award_points`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardResult {
    pub points_added: u64,
    /// Bonus points granted for badges unlocked by this award
    pub bonus_points: u64,
    pub new_total: u64,
    pub level_changed: bool,
    pub rank_changed: bool,
    pub new_level: u32,
    pub new_rank: Rank,
    pub new_badges: Vec<String>,
    pub new_achievements: Vec<String>,
}

/// Outcome of [`crate::ReputationEngine::update_streak`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakResult {
    /// False when the streak was already counted today (no-op)
    pub streak_continued: bool,
    /// True when a gap reset the streak to one day
    pub streak_reset: bool,
    pub current_streak: u32,
    pub longest_streak: u32,
}

/// Leaderboard filter on recent activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    #[default]
    All,
    /// Active within the last 7 days
    Weekly,
    /// Active within the last 30 days
    Monthly,
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!("unknown timeframe: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub position: u64,
    pub user_id: UserId,
    pub total_points: u64,
    pub level: u32,
    pub rank: Rank,
    pub last_activity_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyProgress {
    pub week_start: DateTime<Utc>,
    pub points_this_week: u64,
    pub quizzes_this_week: u64,
    pub target_points: u64,
    pub target_quizzes: u64,
}

/// Combined streak and points outcome of a recorded quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAward {
    pub streak: StreakResult,
    pub award: AwardResult,
}
