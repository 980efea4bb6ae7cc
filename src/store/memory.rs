//! In-memory [`DocumentStore`] for tests and dry runs.
//!
//! One `HashMap` per collection behind `std::sync::RwLock`. Upserts
//! replace the whole document, matching [`SqliteStore`](super::SqliteStore).

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::models::Collection;

use super::{BulkWriteResult, DocumentStore, StoreError, StoredDocument};

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, HashMap<String, serde_json::Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("memory store lock poisoned".to_string())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert_many(
        &self,
        collection: Collection,
        docs: &[StoredDocument],
    ) -> Result<BulkWriteResult, StoreError> {
        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;
        let table = collections.entry(collection).or_default();
        for doc in docs {
            table.insert(doc.id.clone(), doc.body.clone());
        }
        Ok(BulkWriteResult {
            written: docs.len() as u64,
            failed: Vec::new(),
        })
    }

    async fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        Ok(collections
            .get(&collection)
            .and_then(|table| table.get(id))
            .cloned())
    }

    async fn count(&self, collection: Collection) -> Result<u64, StoreError> {
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        Ok(collections
            .get(&collection)
            .map(|table| table.len() as u64)
            .unwrap_or(0))
    }

    async fn ids(&self, collection: Collection) -> Result<Vec<String>, StoreError> {
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        let mut ids: Vec<String> = collections
            .get(&collection)
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }
}
