//! Subscription and payment persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use tutorug_core::{StoreError, UserId, Versioned};

use crate::types::{PaymentRecord, PaymentStatus, SubscriptionRecord, SubscriptionStatus};

/// Storage for one subscription per user plus the payments that fund them.
///
/// Subscription writes follow the same conditional-write contract as the
/// reputation store: `expected = None` inserts only if absent, `Some(v)`
/// replaces only if the stored version is still `v`.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn load(&self, user: &UserId)
        -> Result<Option<Versioned<SubscriptionRecord>>, StoreError>;

    async fn save(&self, record: &SubscriptionRecord, expected: Option<u64>)
        -> Result<u64, StoreError>;

    /// Every record currently stored with one of `statuses`.
    async fn list_by_status(
        &self,
        statuses: &[SubscriptionStatus],
    ) -> Result<Vec<SubscriptionRecord>, StoreError>;

    /// Insert a new payment; a duplicate `tx_ref` is a conflict.
    async fn insert_payment(&self, payment: &PaymentRecord) -> Result<(), StoreError>;

    async fn find_payment(&self, tx_ref: &str) -> Result<Option<PaymentRecord>, StoreError>;

    /// Most recent payments first.
    async fn payments_for(&self, user: &UserId, limit: usize)
        -> Result<Vec<PaymentRecord>, StoreError>;

    async fn set_payment_link(&self, tx_ref: &str, link: &str) -> Result<(), StoreError>;

    /// Mark a pending payment failed. Non-pending payments are left alone
    /// and reported as [`StoreError::PreconditionFailed`].
    async fn fail_payment(&self, tx_ref: &str, reason: &str) -> Result<(), StoreError>;

    /// Mark a pending payment completed and write the subscription it pays
    /// for, as one atomic step.
    ///
    /// Fails with [`StoreError::PreconditionFailed`] if the payment is not
    /// pending and [`StoreError::Conflict`] if the subscription version moved;
    /// in both cases nothing is written.
    async fn complete_payment(
        &self,
        tx_ref: &str,
        gateway_tx_id: Option<&str>,
        completed_at: DateTime<Utc>,
        record: &SubscriptionRecord,
        expected: Option<u64>,
    ) -> Result<u64, StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    subscriptions: HashMap<UserId, Versioned<SubscriptionRecord>>,
    payments: HashMap<String, PaymentRecord>,
}

impl Tables {
    fn check_version(
        &self,
        record: &SubscriptionRecord,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        let current = self.subscriptions.get(&record.user_id).map(|v| v.version);
        if current != expected {
            return Err(StoreError::Conflict {
                key: record.user_id.to_string(),
            });
        }
        Ok(current.map_or(1, |v| v + 1))
    }

    fn pending_payment(&mut self, tx_ref: &str) -> Result<&mut PaymentRecord, StoreError> {
        let payment = self
            .payments
            .get_mut(tx_ref)
            .ok_or_else(|| StoreError::NotFound(tx_ref.to_string()))?;
        if payment.status != PaymentStatus::Pending {
            return Err(StoreError::PreconditionFailed(format!(
                "payment {tx_ref} is not pending"
            )));
        }
        Ok(payment)
    }
}

/// Single-lock in-memory store for tests and dev mode.
#[derive(Debug, Default)]
pub struct InMemorySubscriptionStore {
    tables: RwLock<Tables>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn load(
        &self,
        user: &UserId,
    ) -> Result<Option<Versioned<SubscriptionRecord>>, StoreError> {
        Ok(self.tables.read().await.subscriptions.get(user).cloned())
    }

    async fn save(
        &self,
        record: &SubscriptionRecord,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let next = tables.check_version(record, expected)?;
        tables
            .subscriptions
            .insert(record.user_id.clone(), Versioned::new(record.clone(), next));
        Ok(next)
    }

    async fn list_by_status(
        &self,
        statuses: &[SubscriptionStatus],
    ) -> Result<Vec<SubscriptionRecord>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .subscriptions
            .values()
            .filter(|v| statuses.contains(&v.value.status))
            .map(|v| v.value.clone())
            .collect())
    }

    async fn insert_payment(&self, payment: &PaymentRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.payments.contains_key(&payment.tx_ref) {
            return Err(StoreError::Conflict {
                key: payment.tx_ref.clone(),
            });
        }
        tables
            .payments
            .insert(payment.tx_ref.clone(), payment.clone());
        Ok(())
    }

    async fn find_payment(&self, tx_ref: &str) -> Result<Option<PaymentRecord>, StoreError> {
        Ok(self.tables.read().await.payments.get(tx_ref).cloned())
    }

    async fn payments_for(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<PaymentRecord>, StoreError> {
        let mut payments: Vec<PaymentRecord> = self
            .tables
            .read()
            .await
            .payments
            .values()
            .filter(|p| &p.user_id == user)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        payments.truncate(limit);
        Ok(payments)
    }

    async fn set_payment_link(&self, tx_ref: &str, link: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let payment = tables
            .payments
            .get_mut(tx_ref)
            .ok_or_else(|| StoreError::NotFound(tx_ref.to_string()))?;
        payment.payment_link = Some(link.to_string());
        Ok(())
    }

    async fn fail_payment(&self, tx_ref: &str, reason: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let payment = tables.pending_payment(tx_ref)?;
        payment.status = PaymentStatus::Failed;
        payment.failure_reason = Some(reason.to_string());
        Ok(())
    }

    async fn complete_payment(
        &self,
        tx_ref: &str,
        gateway_tx_id: Option<&str>,
        completed_at: DateTime<Utc>,
        record: &SubscriptionRecord,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;

        // Validate both halves before writing either
        tables.pending_payment(tx_ref)?;
        let next = tables.check_version(record, expected)?;

        let payment = tables.pending_payment(tx_ref)?;
        payment.status = PaymentStatus::Completed;
        payment.gateway_tx_id = gateway_tx_id.map(str::to_string);
        payment.completed_at = Some(completed_at);

        tables
            .subscriptions
            .insert(record.user_id.clone(), Versioned::new(record.clone(), next));
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlanId;
    use chrono::Duration;

    fn user() -> UserId {
        UserId::parse("learner-1").unwrap()
    }

    fn trial(now: DateTime<Utc>) -> SubscriptionRecord {
        SubscriptionRecord::new_trial(user(), now, now + Duration::days(7))
    }

    #[tokio::test]
    async fn test_complete_payment_is_all_or_nothing() {
        let store = InMemorySubscriptionStore::new();
        let now = Utc::now();
        let record = trial(now);
        store.save(&record, None).await.unwrap();
        store
            .insert_payment(&PaymentRecord::pending(
                "TUG-1".into(),
                user(),
                PlanId::Monthly.plan(),
                now,
            ))
            .await
            .unwrap();

        let mut active = record.clone();
        active.status = SubscriptionStatus::Active;

        // Stale version: neither half applied
        let err = store
            .complete_payment("TUG-1", Some("flw-1"), now, &active, Some(7))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        let payment = store.find_payment("TUG-1").await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);

        assert_eq!(
            store
                .complete_payment("TUG-1", Some("flw-1"), now, &active, Some(1))
                .await
                .unwrap(),
            2
        );
        let payment = store.find_payment("TUG-1").await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.gateway_tx_id.as_deref(), Some("flw-1"));

        // Second completion is refused
        let err = store
            .complete_payment("TUG-1", None, now, &active, Some(2))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PreconditionFailed(_)));
        assert_eq!(store.load(&user()).await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_payments_newest_first() {
        let store = InMemorySubscriptionStore::new();
        let now = Utc::now();
        for (i, tx) in ["a", "b", "c"].iter().enumerate() {
            store
                .insert_payment(&PaymentRecord::pending(
                    tx.to_string(),
                    user(),
                    PlanId::Monthly.plan(),
                    now + Duration::minutes(i as i64),
                ))
                .await
                .unwrap();
        }

        let history = store.payments_for(&user(), 2).await.unwrap();
        let refs: Vec<&str> = history.iter().map(|p| p.tx_ref.as_str()).collect();
        assert_eq!(refs, vec!["c", "b"]);
    }
}
