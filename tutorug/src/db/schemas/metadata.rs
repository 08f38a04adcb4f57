//! Common metadata for all documents

use bson::DateTime;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl Metadata {
    /// Metadata carrying a record's own timestamps.
    pub fn stamped(created_at: chrono::DateTime<Utc>, updated_at: chrono::DateTime<Utc>) -> Self {
        Self {
            updated_at: Some(DateTime::from_chrono(updated_at)),
            created_at: Some(DateTime::from_chrono(created_at)),
        }
    }

    /// Fill in missing timestamps with the current time.
    pub fn touch(&mut self) {
        let now = DateTime::now();
        self.updated_at.get_or_insert(now);
        self.created_at.get_or_insert(now);
    }
}
