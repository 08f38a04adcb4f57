//! Payment document schema

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use subscription::{PaymentRecord, PaymentStatus, PlanId};
use tutorug_core::StoreError;

use super::{corrupt, opt_to_bson, opt_to_chrono, parse_user, Metadata};
use crate::db::mongo::{IntoIndexes, MutMetadata};

pub const PAYMENT_COLLECTION: &str = "payments";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PaymentDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Our transaction reference (unique)
    pub tx_ref: String,

    pub user_id: String,

    pub plan: String,

    /// Whole Uganda shillings
    pub amount: i64,

    pub currency: String,

    pub status: String,

    #[serde(default)]
    pub gateway_tx_id: Option<String>,

    #[serde(default)]
    pub payment_link: Option<String>,

    #[serde(default)]
    pub failure_reason: Option<String>,

    #[serde(default)]
    pub completed_at: Option<DateTime>,
}

impl PaymentDoc {
    pub fn from_record(record: &PaymentRecord) -> Self {
        Self {
            _id: None,
            metadata: Metadata::stamped(record.created_at, record.created_at),
            tx_ref: record.tx_ref.clone(),
            user_id: record.user_id.to_string(),
            plan: record.plan.as_str().to_string(),
            amount: i64::try_from(record.amount).unwrap_or(i64::MAX),
            currency: record.currency.clone(),
            status: record.status.as_str().to_string(),
            gateway_tx_id: record.gateway_tx_id.clone(),
            payment_link: record.payment_link.clone(),
            failure_reason: record.failure_reason.clone(),
            completed_at: opt_to_bson(record.completed_at),
        }
    }

    pub fn to_record(&self) -> Result<PaymentRecord, StoreError> {
        let c = PAYMENT_COLLECTION;
        Ok(PaymentRecord {
            tx_ref: self.tx_ref.clone(),
            user_id: parse_user(c, &self.user_id)?,
            plan: self.plan.parse::<PlanId>().map_err(|e| corrupt(c, e))?,
            amount: u64::try_from(self.amount).map_err(|e| corrupt(c, e))?,
            currency: self.currency.clone(),
            status: self.status.parse::<PaymentStatus>().map_err(|e| corrupt(c, e))?,
            gateway_tx_id: self.gateway_tx_id.clone(),
            payment_link: self.payment_link.clone(),
            failure_reason: self.failure_reason.clone(),
            created_at: self
                .metadata
                .created_at
                .ok_or_else(|| corrupt(c, "missing created_at"))?
                .to_chrono(),
            completed_at: opt_to_chrono(self.completed_at),
        })
    }
}

impl IntoIndexes for PaymentDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "tx_ref": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("tx_ref_unique".to_string())
                        .build(),
                ),
            ),
            // Payment history, newest first
            (
                doc! { "user_id": 1, "metadata.created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("user_history_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for PaymentDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
