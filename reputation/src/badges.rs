//! Badge and achievement predicates.
//!
//! Unlocking inserts into the record's sets, so an id already present is
//! never returned again regardless of how often the predicate holds.

use crate::activity::ActivityCounts;
use crate::config::{AchievementCriterion, AchievementRule, BadgeCriterion, BadgeRule};
use crate::types::ReputationRecord;

impl BadgeCriterion {
    pub fn is_met(&self, record: &ReputationRecord) -> bool {
        match *self {
            BadgeCriterion::StreakAtLeast { days } => record.streak_days >= days,
            BadgeCriterion::LongestStreakAtLeast { days } => record.longest_streak >= days,
            BadgeCriterion::TotalPointsAtLeast { points } => record.total_points >= points,
            BadgeCriterion::LevelAtLeast { level } => record.current_level >= level,
        }
    }
}

impl AchievementCriterion {
    pub fn is_met(&self, counts: &ActivityCounts) -> bool {
        match *self {
            AchievementCriterion::CompletedQuizzesAtLeast { count } => {
                counts.completed_quizzes >= count
            }
            AchievementCriterion::PerfectScoresAtLeast { count } => counts.perfect_scores >= count,
        }
    }
}

/// Record every newly satisfied badge and return the rules that unlocked.
pub fn unlock_badges<'a>(
    record: &mut ReputationRecord,
    rules: &'a [BadgeRule],
) -> Vec<&'a BadgeRule> {
    let mut unlocked = Vec::new();
    for rule in rules {
        if !record.badges_earned.contains(&rule.id) && rule.criterion.is_met(record) {
            record.badges_earned.insert(rule.id.clone());
            unlocked.push(rule);
        }
    }
    unlocked
}

/// Record every newly satisfied achievement and return their ids.
pub fn unlock_achievements(
    record: &mut ReputationRecord,
    rules: &[AchievementRule],
    counts: &ActivityCounts,
) -> Vec<String> {
    let mut unlocked = Vec::new();
    for rule in rules {
        if rule.criterion.is_met(counts) && record.achievements_unlocked.insert(rule.id.clone()) {
            unlocked.push(rule.id.clone());
        }
    }
    unlocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PointsConfig;
    use chrono::Utc;
    use tutorug_core::UserId;

    fn record() -> ReputationRecord {
        ReputationRecord::new(UserId::parse("u").unwrap(), Utc::now())
    }

    #[test]
    fn test_badge_unlocks_once() {
        let config = PointsConfig::default();
        let mut r = record();
        r.streak_days = 8;
        r.longest_streak = 8;

        let first: Vec<_> = unlock_badges(&mut r, &config.badges)
            .into_iter()
            .map(|b| b.id.clone())
            .collect();
        assert_eq!(first, vec!["week_warrior".to_string()]);

        assert!(unlock_badges(&mut r, &config.badges).is_empty());
        assert_eq!(r.badges_earned.len(), 1);
    }

    #[test]
    fn test_achievements_from_counts() {
        let config = PointsConfig::default();
        let mut r = record();
        let counts = ActivityCounts {
            completed_quizzes: 12,
            perfect_scores: 5,
            quizzes_this_week: 3,
        };

        let mut got = unlock_achievements(&mut r, &config.achievements, &counts);
        got.sort();
        assert_eq!(got, vec!["perfect_scorer_5", "quiz_taker_10"]);
        assert!(unlock_achievements(&mut r, &config.achievements, &counts).is_empty());
    }
}
