//! Points configuration.
//!
//! One immutable value handed to the engine at construction. The defaults
//! reproduce the production tables; deployments can override any part of
//! them from YAML.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ReputationError;
use crate::types::Rank;

/// Default bonus awarded when a badge unlocks.
pub const DEFAULT_BADGE_BONUS: u64 = 25;

/// Complete reputation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointsConfig {
    /// Minimum total for each level; index 0 is level 1
    pub level_thresholds: Vec<u64>,
    /// Minimum total for each rank, ascending
    pub rank_thresholds: Vec<RankThreshold>,
    /// Point amounts per learning event
    pub points: PointAmounts,
    /// Badges checked after every award
    pub badges: Vec<BadgeRule>,
    /// Achievements checked against activity counts
    pub achievements: Vec<AchievementRule>,
    /// Upper bound on bonus awards processed for a single event
    pub max_bonus_awards: usize,
    pub weekly_targets: WeeklyTargets,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            level_thresholds: vec![0, 100, 250, 500, 1000, 1750, 2750, 4000, 5500, 7500],
            rank_thresholds: vec![
                RankThreshold::new(Rank::Learner, 0),
                RankThreshold::new(Rank::Helper, 500),
                RankThreshold::new(Rank::Tutor, 1500),
                RankThreshold::new(Rank::Expert, 3000),
                RankThreshold::new(Rank::Master, 6000),
            ],
            points: PointAmounts::default(),
            badges: default_badges(),
            achievements: default_achievements(),
            max_bonus_awards: 16,
            weekly_targets: WeeklyTargets::default(),
        }
    }
}

impl PointsConfig {
    /// Load config from YAML, then validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self, ReputationError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ReputationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Same tables, but badges grant no bonus points.
    pub fn without_badge_bonuses(mut self) -> Self {
        for badge in &mut self.badges {
            badge.bonus = 0;
        }
        self
    }

    /// Check the tables are usable.
    pub fn validate(&self) -> Result<(), ReputationError> {
        match self.level_thresholds.first() {
            Some(0) => {}
            Some(_) => return Err(config_err("level_thresholds must start at 0")),
            None => return Err(config_err("level_thresholds must not be empty")),
        }
        if self.level_thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(config_err("level_thresholds must be strictly increasing"));
        }

        match self.rank_thresholds.first() {
            Some(first) if first.min_points == 0 => {}
            _ => return Err(config_err("rank_thresholds must start at 0")),
        }
        if self
            .rank_thresholds
            .windows(2)
            .any(|w| w[0].min_points >= w[1].min_points || w[0].rank >= w[1].rank)
        {
            return Err(config_err("rank_thresholds must be ascending"));
        }

        let mut seen = HashSet::new();
        for id in self
            .badges
            .iter()
            .map(|b| &b.id)
            .chain(self.achievements.iter().map(|a| &a.id))
        {
            if id.is_empty() {
                return Err(config_err("badge and achievement ids must not be empty"));
            }
            if !seen.insert(id) {
                return Err(ReputationError::Config(format!("duplicate id: {id}")));
            }
        }

        Ok(())
    }
}

fn config_err(msg: &str) -> ReputationError {
    ReputationError::Config(msg.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankThreshold {
    pub rank: Rank,
    pub min_points: u64,
}

impl RankThreshold {
    pub fn new(rank: Rank, min_points: u64) -> Self {
        Self { rank, min_points }
    }
}

/// Points granted per learning event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointAmounts {
    pub quiz_completed: u64,
    pub quiz_passed: u64,
    /// Score of at least 90%
    pub quiz_high_score: u64,
    /// Score of exactly 100%
    pub quiz_perfect: u64,
    pub topic_completed: u64,
    pub subtopic_completed: u64,
    pub ai_chat_message: u64,
    pub study_streak_day: u64,
    pub community_post: u64,
    pub helpful_response: u64,
    pub question_answered: u64,
    pub first_quiz: u64,
    pub weekly_streak_7: u64,
    pub monthly_streak_30: u64,
    pub subject_master: u64,
    pub high_scorer: u64,
}

impl Default for PointAmounts {
    fn default() -> Self {
        Self {
            quiz_completed: 10,
            quiz_passed: 25,
            quiz_high_score: 50,
            quiz_perfect: 100,
            topic_completed: 5,
            subtopic_completed: 2,
            ai_chat_message: 1,
            study_streak_day: 3,
            community_post: 5,
            helpful_response: 10,
            question_answered: 15,
            first_quiz: 20,
            weekly_streak_7: 50,
            monthly_streak_30: 200,
            subject_master: 100,
            high_scorer: 75,
        }
    }
}

impl PointAmounts {
    /// Points for finishing a quiz with `score` percent.
    pub fn quiz_points(&self, score: u8, passing_score: u8) -> u64 {
        let mut points = self.quiz_completed;
        if score >= passing_score {
            points += self.quiz_passed;
        }
        if score >= 90 {
            points += self.quiz_high_score;
        }
        if score == 100 {
            points += self.quiz_perfect;
        }
        points
    }
}

/// Badge predicate over the reputation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BadgeCriterion {
    StreakAtLeast { days: u32 },
    LongestStreakAtLeast { days: u32 },
    TotalPointsAtLeast { points: u64 },
    LevelAtLeast { level: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeRule {
    pub id: String,
    pub criterion: BadgeCriterion,
    #[serde(default = "default_badge_bonus")]
    pub bonus: u64,
}

fn default_badge_bonus() -> u64 {
    DEFAULT_BADGE_BONUS
}

impl BadgeRule {
    pub fn new(id: impl Into<String>, criterion: BadgeCriterion) -> Self {
        Self {
            id: id.into(),
            criterion,
            bonus: DEFAULT_BADGE_BONUS,
        }
    }
}

/// Achievement predicate over activity counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AchievementCriterion {
    CompletedQuizzesAtLeast { count: u64 },
    PerfectScoresAtLeast { count: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementRule {
    pub id: String,
    pub criterion: AchievementCriterion,
}

impl AchievementRule {
    pub fn new(id: impl Into<String>, criterion: AchievementCriterion) -> Self {
        Self {
            id: id.into(),
            criterion,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeeklyTargets {
    pub points: u64,
    pub quizzes: u64,
}

impl Default for WeeklyTargets {
    fn default() -> Self {
        Self {
            points: 100,
            quizzes: 5,
        }
    }
}

fn default_badges() -> Vec<BadgeRule> {
    use BadgeCriterion::*;
    vec![
        BadgeRule::new("week_warrior", StreakAtLeast { days: 7 }),
        BadgeRule::new("month_master", StreakAtLeast { days: 30 }),
        BadgeRule::new("century_streak", LongestStreakAtLeast { days: 100 }),
        BadgeRule::new("point_hoarder_1000", TotalPointsAtLeast { points: 1000 }),
        BadgeRule::new("point_hoarder_5000", TotalPointsAtLeast { points: 5000 }),
        BadgeRule::new("level_5_climber", LevelAtLeast { level: 5 }),
        BadgeRule::new("level_10_achiever", LevelAtLeast { level: 10 }),
    ]
}

fn default_achievements() -> Vec<AchievementRule> {
    use AchievementCriterion::*;
    vec![
        AchievementRule::new("quiz_taker_10", CompletedQuizzesAtLeast { count: 10 }),
        AchievementRule::new("quiz_taker_50", CompletedQuizzesAtLeast { count: 50 }),
        AchievementRule::new("perfect_scorer_5", PerfectScoresAtLeast { count: 5 }),
    ]
}
