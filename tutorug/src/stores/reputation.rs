//! MongoDB-backed reputation store and quiz activity log

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::options::FindOptions;
use std::collections::BTreeMap;

use reputation::store::leaderboard_order;
use reputation::{
    ActivityCounts, ActivityLog, QuizAttempt, Rank, ReputationError, ReputationRecord,
    ReputationStore,
};
use tutorug_core::{StoreError, UserId, Versioned};

use crate::db::schemas::{
    version_to_bson, QuizAttemptDoc, ReputationDoc, QUIZ_ATTEMPT_COLLECTION, REPUTATION_COLLECTION,
};
use crate::db::{backend, MongoClient, MongoCollection};
use crate::types::TutorugError;

pub struct MongoReputationStore {
    collection: MongoCollection<ReputationDoc>,
}

impl MongoReputationStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self, TutorugError> {
        let collection = mongo
            .collection::<ReputationDoc>(REPUTATION_COLLECTION)
            .await?;
        Ok(Self { collection })
    }

    fn to_records(docs: Vec<ReputationDoc>) -> Result<Vec<ReputationRecord>, StoreError> {
        docs.iter().map(ReputationDoc::to_record).collect()
    }
}

#[async_trait]
impl ReputationStore for MongoReputationStore {
    async fn load(&self, user: &UserId) -> Result<Option<Versioned<ReputationRecord>>, StoreError> {
        let Some(doc) = self
            .collection
            .find_one(doc! { "user_id": user.as_str() })
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(Versioned::new(doc.to_record()?, doc.version())))
    }

    async fn save(
        &self,
        record: &ReputationRecord,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        let key = record.user_id.to_string();
        match expected {
            None => {
                self.collection
                    .insert_one(ReputationDoc::from_record(record, 1), &key)
                    .await?;
                Ok(1)
            }
            Some(version) => {
                let next = version + 1;
                let matched = self
                    .collection
                    .replace_one(
                        doc! { "user_id": key.as_str(), "version": version_to_bson(version) },
                        ReputationDoc::from_record(record, next),
                    )
                    .await?;
                if !matched {
                    return Err(StoreError::Conflict { key });
                }
                Ok(next)
            }
        }
    }

    async fn count_above(&self, total: u64) -> Result<u64, StoreError> {
        let total = i64::try_from(total).unwrap_or(i64::MAX);
        self.collection
            .count(doc! { "total_points": { "$gt": total } })
            .await
    }

    /// Ties on the cutoff total are resolved in memory, so every user
    /// sharing the last place's points is fetched before ordering.
    async fn top(
        &self,
        limit: usize,
        active_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ReputationRecord>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut filter = Document::new();
        if let Some(since) = active_since {
            filter.insert(
                "last_activity_at",
                doc! { "$gte": bson::DateTime::from_chrono(since) },
            );
        }

        let cutoff_options = FindOptions::builder()
            .sort(doc! { "total_points": -1 })
            .skip(u64::try_from(limit - 1).unwrap_or(u64::MAX))
            .limit(1)
            .build();
        let cutoff = self
            .collection
            .find_many(filter.clone(), Some(cutoff_options))
            .await?
            .first()
            .map(|d| d.total_points);

        if let Some(cutoff) = cutoff {
            filter.insert("total_points", doc! { "$gte": cutoff });
        }

        let mut records = Self::to_records(self.collection.find_many(filter, None).await?)?;
        records.sort_by(leaderboard_order);
        records.truncate(limit);
        Ok(records)
    }

    async fn rank_counts(&self) -> Result<BTreeMap<Rank, u64>, StoreError> {
        let mut counts: BTreeMap<Rank, u64> = Rank::ALL.into_iter().map(|r| (r, 0)).collect();

        let pipeline = vec![doc! { "$group": { "_id": "$rank", "count": { "$sum": 1 } } }];
        let groups: Vec<Document> = self
            .collection
            .inner()
            .aggregate(pipeline)
            .await
            .map_err(backend)?
            .try_collect()
            .await
            .map_err(backend)?;

        for group in groups {
            let Some(rank) = group
                .get_str("_id")
                .ok()
                .and_then(|s| s.parse::<Rank>().ok())
            else {
                continue;
            };
            let count = match group.get("count") {
                Some(Bson::Int32(n)) => u64::try_from(*n).unwrap_or(0),
                Some(Bson::Int64(n)) => u64::try_from(*n).unwrap_or(0),
                _ => 0,
            };
            counts.insert(rank, count);
        }
        Ok(counts)
    }
}

pub struct MongoActivityLog {
    collection: MongoCollection<QuizAttemptDoc>,
}

impl MongoActivityLog {
    pub async fn new(mongo: &MongoClient) -> Result<Self, TutorugError> {
        let collection = mongo
            .collection::<QuizAttemptDoc>(QUIZ_ATTEMPT_COLLECTION)
            .await?;
        Ok(Self { collection })
    }
}

fn activity_error(err: StoreError) -> ReputationError {
    ReputationError::Activity(err.to_string())
}

#[async_trait]
impl ActivityLog for MongoActivityLog {
    async fn record_quiz(&self, attempt: QuizAttempt) -> Result<(), ReputationError> {
        self.collection
            .insert_one(QuizAttemptDoc::from(&attempt), attempt.user_id.as_str())
            .await
            .map_err(activity_error)
    }

    async fn counts(
        &self,
        user: &UserId,
        week_start: DateTime<Utc>,
    ) -> Result<ActivityCounts, ReputationError> {
        let user = user.as_str();
        let (completed_quizzes, perfect_scores, quizzes_this_week) = tokio::try_join!(
            self.collection.count(doc! { "user_id": user }),
            self.collection.count(doc! { "user_id": user, "score": 100 }),
            self.collection.count(doc! {
                "user_id": user,
                "completed_at": { "$gte": bson::DateTime::from_chrono(week_start) },
            }),
        )
        .map_err(activity_error)?;

        Ok(ActivityCounts {
            completed_quizzes,
            perfect_scores,
            quizzes_this_week,
        })
    }
}
