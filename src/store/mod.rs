//! Document store abstraction for ingested records.
//!
//! The [`DocumentStore`] trait is the seam between the ingestion pipeline
//! and the persistence backend. Records are stored as JSON documents keyed
//! by id, one logical collection per record kind; writes are full-document
//! upserts so re-ingesting the same input converges to the same state.
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`SqliteStore`] | Durable storage, one table per collection |
//! | [`MemoryStore`] | Tests and `--dry-run` |

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::{Collection, Record};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A record serialized for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub body: serde_json::Value,
}

impl StoredDocument {
    pub fn from_record<R: Record>(record: &R) -> Result<Self, StoreError> {
        Ok(Self {
            id: record.id().to_string(),
            body: serde_json::to_value(record)?,
        })
    }
}

/// Per-document failure inside an unordered bulk write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentWriteError {
    pub id: String,
    pub error: String,
}

/// Outcome of one [`DocumentStore::upsert_many`] call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkWriteResult {
    /// Documents inserted or replaced.
    pub written: u64,
    pub failed: Vec<DocumentWriteError>,
}

/// Abstract persistence backend for ingested records.
///
/// `upsert_many` is unordered: a document that cannot be written is
/// reported in [`BulkWriteResult::failed`] and the remaining documents are
/// still written. An `Err` return means nothing from the call can be
/// assumed persisted.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Cheap liveness check run before a persistence phase.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn upsert_many(
        &self,
        collection: Collection,
        docs: &[StoredDocument],
    ) -> Result<BulkWriteResult, StoreError>;

    async fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError>;

    async fn count(&self, collection: Collection) -> Result<u64, StoreError>;

    /// All ids in a collection, sorted.
    async fn ids(&self, collection: Collection) -> Result<Vec<String>, StoreError>;
}
