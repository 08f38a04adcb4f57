//! Database schemas
//!
//! MongoDB document structures for subscriptions, payments, reputation,
//! quiz attempts, chat sessions and user contact details, with conversions
//! to and from the domain records.

mod chat_session;
mod metadata;
mod payment;
mod quiz_attempt;
mod reputation;
mod subscription;
mod user;

pub use chat_session::{ChatSessionDoc, CHAT_SESSION_COLLECTION};
pub use metadata::Metadata;
pub use payment::{PaymentDoc, PAYMENT_COLLECTION};
pub use quiz_attempt::{QuizAttemptDoc, QUIZ_ATTEMPT_COLLECTION};
pub use self::reputation::{ReputationDoc, REPUTATION_COLLECTION};
pub use self::subscription::{SubscriptionDoc, SUBSCRIPTION_COLLECTION};
pub use user::{UserDoc, USER_COLLECTION};

use chrono::{NaiveDate, Utc};
use tutorug_core::{StoreError, UserId};

fn to_bson(at: chrono::DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_chrono(at)
}

fn opt_to_bson(at: Option<chrono::DateTime<Utc>>) -> Option<bson::DateTime> {
    at.map(to_bson)
}

fn opt_to_chrono(at: Option<bson::DateTime>) -> Option<chrono::DateTime<Utc>> {
    at.map(|d| d.to_chrono())
}

fn day_to_string(day: Option<NaiveDate>) -> Option<String> {
    day.map(|d| d.format("%Y-%m-%d").to_string())
}

fn parse_day(collection: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, StoreError> {
    raw.map(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| corrupt(collection, e.to_string()))
    })
    .transpose()
}

fn parse_user(collection: &str, raw: &str) -> Result<UserId, StoreError> {
    UserId::parse(raw).map_err(|e| corrupt(collection, e.to_string()))
}

fn corrupt(collection: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("corrupt document in {}: {}", collection, detail))
}

/// Versions are stored as BSON int64.
pub fn version_to_bson(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}
