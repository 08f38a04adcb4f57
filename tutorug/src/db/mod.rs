//! MongoDB persistence

pub mod mongo;
pub mod schemas;

pub use mongo::{backend, store_error, IntoIndexes, MongoClient, MongoCollection, MutMetadata};
