//! Reputation persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use tutorug_core::{StoreError, UserId, Versioned};

use crate::types::{Rank, ReputationRecord};

/// Storage for one reputation record per user.
///
/// Writes are conditional on the version the caller read: `expected = None`
/// inserts and fails if a record already exists, `Some(v)` replaces only if
/// the stored version is still `v`. Both fail with [`StoreError::Conflict`].
#[async_trait]
pub trait ReputationStore: Send + Sync {
    async fn load(&self, user: &UserId) -> Result<Option<Versioned<ReputationRecord>>, StoreError>;

    /// Persist `record`, returning the new version.
    async fn save(&self, record: &ReputationRecord, expected: Option<u64>)
        -> Result<u64, StoreError>;

    /// Number of users with strictly more than `total` points.
    async fn count_above(&self, total: u64) -> Result<u64, StoreError>;

    /// Highest totals first, then earliest activity, then user id.
    async fn top(
        &self,
        limit: usize,
        active_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ReputationRecord>, StoreError>;

    async fn rank_counts(&self) -> Result<BTreeMap<Rank, u64>, StoreError>;
}

/// Leaderboard ordering shared by every store implementation.
pub fn leaderboard_order(a: &ReputationRecord, b: &ReputationRecord) -> Ordering {
    b.total_points
        .cmp(&a.total_points)
        .then_with(|| match (a.last_activity_at, b.last_activity_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// DashMap-backed store for tests and dev mode.
#[derive(Debug, Default)]
pub struct InMemoryReputationStore {
    records: DashMap<UserId, Versioned<ReputationRecord>>,
}

impl InMemoryReputationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ReputationStore for InMemoryReputationStore {
    async fn load(&self, user: &UserId) -> Result<Option<Versioned<ReputationRecord>>, StoreError> {
        Ok(self.records.get(user).map(|r| r.value().clone()))
    }

    async fn save(
        &self,
        record: &ReputationRecord,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        let conflict = || StoreError::Conflict {
            key: record.user_id.to_string(),
        };

        match (self.records.entry(record.user_id.clone()), expected) {
            (Entry::Vacant(slot), None) => {
                slot.insert(Versioned::new(record.clone(), 1));
                Ok(1)
            }
            (Entry::Occupied(mut slot), Some(version)) if slot.get().version == version => {
                let next = version + 1;
                slot.insert(Versioned::new(record.clone(), next));
                Ok(next)
            }
            _ => Err(conflict()),
        }
    }

    async fn count_above(&self, total: u64) -> Result<u64, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.value.total_points > total)
            .count() as u64)
    }

    async fn top(
        &self,
        limit: usize,
        active_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ReputationRecord>, StoreError> {
        let mut records: Vec<ReputationRecord> = self
            .records
            .iter()
            .filter(|r| match active_since {
                Some(since) => r.value.last_activity_at.is_some_and(|at| at >= since),
                None => true,
            })
            .map(|r| r.value.clone())
            .collect();
        records.sort_by(leaderboard_order);
        records.truncate(limit);
        Ok(records)
    }

    async fn rank_counts(&self) -> Result<BTreeMap<Rank, u64>, StoreError> {
        let mut counts: BTreeMap<Rank, u64> = Rank::ALL.into_iter().map(|r| (r, 0)).collect();
        for r in self.records.iter() {
            *counts.entry(r.value.rank).or_default() += 1;
        }
        Ok(counts)
    }
}
