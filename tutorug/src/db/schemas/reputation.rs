//! Reputation document schema

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use reputation::{Rank, ReputationRecord};
use tutorug_core::StoreError;

use super::{
    corrupt, day_to_string, opt_to_bson, opt_to_chrono, parse_day, parse_user, to_bson,
    version_to_bson, Metadata,
};
use crate::db::mongo::{IntoIndexes, MutMetadata};

pub const REPUTATION_COLLECTION: &str = "reputations";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReputationDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub user_id: String,

    pub version: i64,

    pub total_points: i64,
    pub weekly_points: i64,
    pub monthly_points: i64,
    pub current_level: i32,
    pub rank: String,
    pub streak_days: i32,
    pub longest_streak: i32,

    #[serde(default)]
    pub last_streak_on: Option<String>,

    #[serde(default)]
    pub badges_earned: Vec<String>,

    #[serde(default)]
    pub achievements_unlocked: Vec<String>,

    #[serde(default)]
    pub last_activity_at: Option<DateTime>,

    pub week_window_start: DateTime,
    pub month_window_start: DateTime,
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn to_i32(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

impl ReputationDoc {
    pub fn from_record(record: &ReputationRecord, version: u64) -> Self {
        Self {
            _id: None,
            metadata: Metadata::stamped(
                record.created_at,
                record.last_activity_at.unwrap_or(record.created_at),
            ),
            user_id: record.user_id.to_string(),
            version: version_to_bson(version),
            total_points: to_i64(record.total_points),
            weekly_points: to_i64(record.weekly_points),
            monthly_points: to_i64(record.monthly_points),
            current_level: to_i32(record.current_level),
            rank: record.rank.as_str().to_string(),
            streak_days: to_i32(record.streak_days),
            longest_streak: to_i32(record.longest_streak),
            last_streak_on: day_to_string(record.last_streak_on),
            badges_earned: record.badges_earned.iter().cloned().collect(),
            achievements_unlocked: record.achievements_unlocked.iter().cloned().collect(),
            last_activity_at: opt_to_bson(record.last_activity_at),
            week_window_start: to_bson(record.week_window_start),
            month_window_start: to_bson(record.month_window_start),
        }
    }

    pub fn version(&self) -> u64 {
        u64::try_from(self.version).unwrap_or(0)
    }

    pub fn to_record(&self) -> Result<ReputationRecord, StoreError> {
        let c = REPUTATION_COLLECTION;
        let unsigned = |n: i64| u64::try_from(n).map_err(|e| corrupt(c, e));
        let small = |n: i32| u32::try_from(n).map_err(|e| corrupt(c, e));

        Ok(ReputationRecord {
            user_id: parse_user(c, &self.user_id)?,
            total_points: unsigned(self.total_points)?,
            weekly_points: unsigned(self.weekly_points)?,
            monthly_points: unsigned(self.monthly_points)?,
            current_level: small(self.current_level)?,
            rank: self.rank.parse::<Rank>().map_err(|e| corrupt(c, e))?,
            streak_days: small(self.streak_days)?,
            longest_streak: small(self.longest_streak)?,
            last_streak_on: parse_day(c, self.last_streak_on.as_deref())?,
            badges_earned: self.badges_earned.iter().cloned().collect(),
            achievements_unlocked: self.achievements_unlocked.iter().cloned().collect(),
            last_activity_at: opt_to_chrono(self.last_activity_at),
            week_window_start: self.week_window_start.to_chrono(),
            month_window_start: self.month_window_start.to_chrono(),
            created_at: self
                .metadata
                .created_at
                .ok_or_else(|| corrupt(c, "missing created_at"))?
                .to_chrono(),
        })
    }
}

impl IntoIndexes for ReputationDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("user_id_unique".to_string())
                        .build(),
                ),
            ),
            // Leaderboard scans
            (
                doc! { "total_points": -1, "last_activity_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("leaderboard_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ReputationDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tutorug_core::UserId;

    #[test]
    fn test_record_survives_document_form() {
        let now = Utc.with_ymd_and_hms(2025, 4, 2, 7, 30, 0).unwrap();
        let mut record = ReputationRecord::new(UserId::parse("student-3").unwrap(), now);
        record.total_points = 520;
        record.rank = Rank::Helper;
        record.current_level = 4;
        record.streak_days = 3;
        record.longest_streak = 3;
        record.last_streak_on = Some(now.date_naive());
        record.badges_earned.insert("week_warrior".into());
        record.last_activity_at = Some(now);

        let doc = ReputationDoc::from_record(&record, 2);
        assert_eq!(doc.rank, "helper");
        assert_eq!(doc.to_record().unwrap(), record);
    }
}
