//! MongoDB client and collection wrapper

use bson::{doc, Document};
use futures_util::TryStreamExt;
use mongodb::{
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{FindOptions, IndexOptions, UpdateModifications},
    results::UpdateResult,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use tutorug_core::StoreError;

use crate::db::schemas::Metadata;
use crate::types::TutorugError;

/// Server error code for a unique index violation
const DUPLICATE_KEY: i32 = 11000;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, TutorugError> {
        info!("Connecting to MongoDB at {}", uri);

        // Fail fast instead of hanging on an unreachable server
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| TutorugError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| TutorugError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection, creating its indexes
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, TutorugError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
{
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, TutorugError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };
        mongo_collection.apply_indexes().await?;
        Ok(mongo_collection)
    }

    async fn apply_indexes(&self) -> Result<(), TutorugError> {
        let indices: Vec<IndexModel> = T::into_indices()
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        if indices.is_empty() {
            return Ok(());
        }

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| TutorugError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, stamping its metadata. A unique-index violation
    /// is reported as a conflict.
    pub async fn insert_one(&self, mut item: T, key: &str) -> Result<(), StoreError> {
        item.mut_metadata().touch();
        self.inner
            .insert_one(item)
            .await
            .map(|_| ())
            .map_err(|e| store_error(e, key))
    }

    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, StoreError> {
        self.inner.find_one(filter).await.map_err(backend)
    }

    pub async fn find_many(
        &self,
        filter: Document,
        options: Option<FindOptions>,
    ) -> Result<Vec<T>, StoreError> {
        let cursor = self
            .inner
            .find(filter)
            .with_options(options)
            .await
            .map_err(backend)?;
        cursor.try_collect().await.map_err(backend)
    }

    /// Replace the document matching `filter`. Returns whether one matched.
    pub async fn replace_one(&self, filter: Document, mut item: T) -> Result<bool, StoreError> {
        item.mut_metadata().touch();
        let result = self
            .inner
            .replace_one(filter, item)
            .await
            .map_err(backend)?;
        Ok(result.matched_count == 1)
    }

    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, StoreError> {
        self.inner.update_one(filter, update).await.map_err(backend)
    }

    pub async fn count(&self, filter: Document) -> Result<u64, StoreError> {
        self.inner.count_documents(filter).await.map_err(backend)
    }

    /// Underlying collection for sessions, aggregation and upserts
    pub fn inner(&self) -> &Collection<T> {
        &self.inner
    }
}

/// Any driver failure as a backend error.
pub fn backend(err: MongoError) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Driver failure, with duplicate keys and transient transaction aborts
/// reported as conflicts on `key`.
pub fn store_error(err: MongoError, key: &str) -> StoreError {
    if is_duplicate_key(&err) || err.contains_label(mongodb::error::TRANSIENT_TRANSACTION_ERROR) {
        StoreError::Conflict {
            key: key.to_string(),
        }
    } else {
        backend(err)
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}
