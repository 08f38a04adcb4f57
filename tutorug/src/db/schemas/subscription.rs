//! Subscription document schema

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use subscription::{PlanId, SubscriptionRecord, SubscriptionStatus};
use tutorug_core::StoreError;

use super::{
    corrupt, day_to_string, opt_to_bson, opt_to_chrono, parse_day, parse_user, version_to_bson,
    Metadata,
};
use crate::db::mongo::{IntoIndexes, MutMetadata};

pub const SUBSCRIPTION_COLLECTION: &str = "subscriptions";

/// One subscription per user, guarded by `version`.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SubscriptionDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub user_id: String,

    /// Optimistic concurrency counter, bumped on every write
    pub version: i64,

    pub status: String,

    #[serde(default)]
    pub plan: Option<String>,

    #[serde(default)]
    pub trial_end_at: Option<DateTime>,

    #[serde(default)]
    pub period_start_at: Option<DateTime>,

    #[serde(default)]
    pub period_end_at: Option<DateTime>,

    #[serde(default)]
    pub cancelled_at: Option<DateTime>,

    #[serde(default)]
    pub ever_paid: bool,

    /// UTC day (YYYY-MM-DD) of the last trial reminder
    #[serde(default)]
    pub last_trial_reminder_on: Option<String>,

    #[serde(default)]
    pub last_renewal_reminder_on: Option<String>,
}

impl SubscriptionDoc {
    pub fn from_record(record: &SubscriptionRecord, version: u64) -> Self {
        Self {
            _id: None,
            metadata: Metadata::stamped(record.created_at, record.updated_at),
            user_id: record.user_id.to_string(),
            version: version_to_bson(version),
            status: record.status.as_str().to_string(),
            plan: record.plan.map(|p| p.as_str().to_string()),
            trial_end_at: opt_to_bson(record.trial_end_at),
            period_start_at: opt_to_bson(record.period_start_at),
            period_end_at: opt_to_bson(record.period_end_at),
            cancelled_at: opt_to_bson(record.cancelled_at),
            ever_paid: record.ever_paid,
            last_trial_reminder_on: day_to_string(record.last_trial_reminder_on),
            last_renewal_reminder_on: day_to_string(record.last_renewal_reminder_on),
        }
    }

    pub fn version(&self) -> u64 {
        u64::try_from(self.version).unwrap_or(0)
    }

    pub fn to_record(&self) -> Result<SubscriptionRecord, StoreError> {
        let c = SUBSCRIPTION_COLLECTION;
        let status: SubscriptionStatus = self.status.parse().map_err(|e| corrupt(c, e))?;
        let plan = self
            .plan
            .as_deref()
            .map(|p| p.parse::<PlanId>().map_err(|e| corrupt(c, e)))
            .transpose()?;
        let created_at = self
            .metadata
            .created_at
            .ok_or_else(|| corrupt(c, "missing created_at"))?
            .to_chrono();

        Ok(SubscriptionRecord {
            user_id: parse_user(c, &self.user_id)?,
            status,
            plan,
            trial_end_at: opt_to_chrono(self.trial_end_at),
            period_start_at: opt_to_chrono(self.period_start_at),
            period_end_at: opt_to_chrono(self.period_end_at),
            cancelled_at: opt_to_chrono(self.cancelled_at),
            ever_paid: self.ever_paid,
            last_trial_reminder_on: parse_day(c, self.last_trial_reminder_on.as_deref())?,
            last_renewal_reminder_on: parse_day(c, self.last_renewal_reminder_on.as_deref())?,
            created_at,
            updated_at: opt_to_chrono(self.metadata.updated_at).unwrap_or(created_at),
        })
    }
}

impl IntoIndexes for SubscriptionDoc {
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
            // Sweeps list by status and end instant
            (
                doc! { "status": 1, "period_end_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("status_period_end_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for SubscriptionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tutorug_core::UserId;

    #[test]
    fn test_record_survives_document_form() {
        let now = Utc.with_ymd_and_hms(2025, 2, 1, 10, 0, 0).unwrap();
        let mut record = SubscriptionRecord::new_trial(
            UserId::parse("student-9").unwrap(),
            now,
            now + Duration::days(7),
        );
        record.last_trial_reminder_on = Some(now.date_naive());

        let doc = SubscriptionDoc::from_record(&record, 4);
        assert_eq!(doc.version(), 4);
        assert_eq!(doc.status, "trial");
        assert_eq!(doc.last_trial_reminder_on.as_deref(), Some("2025-02-01"));
        assert_eq!(doc.to_record().unwrap(), record);
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let mut doc = SubscriptionDoc::from_record(
            &SubscriptionRecord::without_trial(
                UserId::parse("student-9").unwrap(),
                Utc.with_ymd_and_hms(2025, 2, 1, 10, 0, 0).unwrap(),
            ),
            1,
        );
        doc.status = "paused".into();
        assert!(matches!(doc.to_record(), Err(StoreError::Backend(_))));
    }
}
