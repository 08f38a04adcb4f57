//! MongoDB-backed subscription and payment store

use async_trait::async_trait;
use bson::{doc, DateTime};
use chrono::Utc;
use mongodb::{options::FindOptions, ClientSession};
use tracing::{debug, warn};

use subscription::{
    PaymentRecord, PaymentStatus, SubscriptionRecord, SubscriptionStatus, SubscriptionStore,
};
use tutorug_core::{StoreError, UserId, Versioned};

use crate::db::schemas::{
    version_to_bson, PaymentDoc, SubscriptionDoc, PAYMENT_COLLECTION, SUBSCRIPTION_COLLECTION,
};
use crate::db::{backend, store_error, MongoClient, MongoCollection};
use crate::types::TutorugError;

pub struct MongoSubscriptionStore {
    mongo: MongoClient,
    subscriptions: MongoCollection<SubscriptionDoc>,
    payments: MongoCollection<PaymentDoc>,
}

impl MongoSubscriptionStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self, TutorugError> {
        let subscriptions = mongo
            .collection::<SubscriptionDoc>(SUBSCRIPTION_COLLECTION)
            .await?;
        let payments = mongo.collection::<PaymentDoc>(PAYMENT_COLLECTION).await?;
        Ok(Self {
            mongo: mongo.clone(),
            subscriptions,
            payments,
        })
    }

    /// Explain why a conditional payment update matched nothing.
    async fn payment_not_pending(&self, tx_ref: &str) -> StoreError {
        match self.payments.find_one(doc! { "tx_ref": tx_ref }).await {
            Ok(Some(_)) => StoreError::PreconditionFailed(format!("payment {tx_ref} is not pending")),
            Ok(None) => StoreError::NotFound(tx_ref.to_string()),
            Err(e) => e,
        }
    }

    async fn complete_in_session(
        &self,
        session: &mut ClientSession,
        tx_ref: &str,
        gateway_tx_id: Option<&str>,
        completed_at: chrono::DateTime<Utc>,
        record: &SubscriptionRecord,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        let key = record.user_id.to_string();

        let paid = self
            .payments
            .inner()
            .update_one(
                doc! { "tx_ref": tx_ref, "status": PaymentStatus::Pending.as_str() },
                doc! {
                    "$set": {
                        "status": PaymentStatus::Completed.as_str(),
                        "gateway_tx_id": gateway_tx_id,
                        "completed_at": DateTime::from_chrono(completed_at),
                        "metadata.updated_at": DateTime::now(),
                    }
                },
            )
            .session(&mut *session)
            .await
            .map_err(|e| store_error(e, tx_ref))?;
        if paid.matched_count == 0 {
            return Err(self.payment_not_pending(tx_ref).await);
        }

        match expected {
            None => {
                let mut doc = SubscriptionDoc::from_record(record, 1);
                doc.metadata.touch();
                self.subscriptions
                    .inner()
                    .insert_one(doc)
                    .session(&mut *session)
                    .await
                    .map_err(|e| store_error(e, &key))?;
                Ok(1)
            }
            Some(version) => {
                let next = version + 1;
                let replaced = self
                    .subscriptions
                    .inner()
                    .replace_one(
                        doc! { "user_id": key.as_str(), "version": version_to_bson(version) },
                        SubscriptionDoc::from_record(record, next),
                    )
                    .session(&mut *session)
                    .await
                    .map_err(|e| store_error(e, &key))?;
                if replaced.matched_count == 0 {
                    return Err(StoreError::Conflict { key });
                }
                Ok(next)
            }
        }
    }
}

#[async_trait]
impl SubscriptionStore for MongoSubscriptionStore {
    async fn load(
        &self,
        user: &UserId,
    ) -> Result<Option<Versioned<SubscriptionRecord>>, StoreError> {
        let Some(doc) = self
            .subscriptions
            .find_one(doc! { "user_id": user.as_str() })
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(Versioned::new(doc.to_record()?, doc.version())))
    }

    async fn save(
        &self,
        record: &SubscriptionRecord,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        let key = record.user_id.to_string();
        match expected {
            None => {
                self.subscriptions
                    .insert_one(SubscriptionDoc::from_record(record, 1), &key)
                    .await?;
                Ok(1)
            }
            Some(version) => {
                let next = version + 1;
                let matched = self
                    .subscriptions
                    .replace_one(
                        doc! { "user_id": key.as_str(), "version": version_to_bson(version) },
                        SubscriptionDoc::from_record(record, next),
                    )
                    .await?;
                if !matched {
                    return Err(StoreError::Conflict { key });
                }
                Ok(next)
            }
        }
    }

    async fn list_by_status(
        &self,
        statuses: &[SubscriptionStatus],
    ) -> Result<Vec<SubscriptionRecord>, StoreError> {
        let wanted: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        self.subscriptions
            .find_many(doc! { "status": { "$in": wanted } }, None)
            .await?
            .iter()
            .map(SubscriptionDoc::to_record)
            .collect()
    }

    async fn insert_payment(&self, payment: &PaymentRecord) -> Result<(), StoreError> {
        self.payments
            .insert_one(PaymentDoc::from_record(payment), &payment.tx_ref)
            .await
    }

    async fn find_payment(&self, tx_ref: &str) -> Result<Option<PaymentRecord>, StoreError> {
        self.payments
            .find_one(doc! { "tx_ref": tx_ref })
            .await?
            .map(|doc| doc.to_record())
            .transpose()
    }

    async fn payments_for(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<PaymentRecord>, StoreError> {
        let options = FindOptions::builder()
            .sort(doc! { "metadata.created_at": -1 })
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .build();
        self.payments
            .find_many(doc! { "user_id": user.as_str() }, Some(options))
            .await?
            .iter()
            .map(PaymentDoc::to_record)
            .collect()
    }

    async fn set_payment_link(&self, tx_ref: &str, link: &str) -> Result<(), StoreError> {
        let result = self
            .payments
            .update_one(
                doc! { "tx_ref": tx_ref },
                doc! { "$set": { "payment_link": link, "metadata.updated_at": DateTime::now() } },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::NotFound(tx_ref.to_string()));
        }
        Ok(())
    }

    async fn fail_payment(&self, tx_ref: &str, reason: &str) -> Result<(), StoreError> {
        let result = self
            .payments
            .update_one(
                doc! { "tx_ref": tx_ref, "status": PaymentStatus::Pending.as_str() },
                doc! {
                    "$set": {
                        "status": PaymentStatus::Failed.as_str(),
                        "failure_reason": reason,
                        "metadata.updated_at": DateTime::now(),
                    }
                },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(self.payment_not_pending(tx_ref).await);
        }
        Ok(())
    }

    async fn complete_payment(
        &self,
        tx_ref: &str,
        gateway_tx_id: Option<&str>,
        completed_at: chrono::DateTime<Utc>,
        record: &SubscriptionRecord,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut session = self.mongo.inner().start_session().await.map_err(backend)?;
        session.start_transaction().await.map_err(backend)?;

        match self
            .complete_in_session(&mut session, tx_ref, gateway_tx_id, completed_at, record, expected)
            .await
        {
            Ok(version) => {
                session
                    .commit_transaction()
                    .await
                    .map_err(|e| store_error(e, tx_ref))?;
                debug!(tx_ref, user_id = %record.user_id, version, "Payment completed");
                Ok(version)
            }
            Err(e) => {
                if let Err(abort) = session.abort_transaction().await {
                    warn!(tx_ref, error = %abort, "Failed to abort payment transaction");
                }
                Err(e)
            }
        }
    }
}
