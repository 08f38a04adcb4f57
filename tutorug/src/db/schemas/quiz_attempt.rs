//! Quiz attempt document schema

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use reputation::QuizAttempt;

use super::{to_bson, Metadata};
use crate::db::mongo::{IntoIndexes, MutMetadata};

pub const QUIZ_ATTEMPT_COLLECTION: &str = "quiz_attempts";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct QuizAttemptDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub user_id: String,
    pub quiz_title: String,

    /// Percentage, 0 to 100
    pub score: i32,
    pub passing_score: i32,

    pub completed_at: DateTime,
}

impl From<&QuizAttempt> for QuizAttemptDoc {
    fn from(attempt: &QuizAttempt) -> Self {
        Self {
            _id: None,
            metadata: Metadata::stamped(attempt.completed_at, attempt.completed_at),
            user_id: attempt.user_id.to_string(),
            quiz_title: attempt.quiz_title.clone(),
            score: i32::from(attempt.score),
            passing_score: i32::from(attempt.passing_score),
            completed_at: to_bson(attempt.completed_at),
        }
    }
}

impl IntoIndexes for QuizAttemptDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user_id": 1, "completed_at": -1 },
            Some(
                IndexOptions::builder()
                    .name("user_completed_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for QuizAttemptDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
