//! Batched persistence of aggregated records.
//!
//! A buffer is split into chunks of `batch_size` and each chunk becomes one
//! unordered [`DocumentStore::upsert_many`] call. Chunks are independent: a
//! failed chunk is logged and recorded, earlier chunks stay written and
//! later chunks are still attempted.

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::models::{Collection, Record};
use crate::progress::{IngestProgressEvent, IngestProgressReporter};
use crate::store::{DocumentStore, StoredDocument};

/// A write that did not make it into the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteFailure {
    pub collection: Collection,
    /// Zero-based chunk index within the collection.
    pub chunk: usize,
    /// The rejected document, or `None` when the whole chunk failed.
    pub id: Option<String>,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct PersistReport {
    pub persisted: u64,
    pub failures: Vec<WriteFailure>,
}

pub async fn persist_records<R: Record>(
    store: &dyn DocumentStore,
    records: &[R],
    batch_size: usize,
    progress: &dyn IngestProgressReporter,
) -> PersistReport {
    let collection = R::COLLECTION;
    let total = records.len() as u64;
    let mut report = PersistReport::default();
    let mut attempted = 0u64;

    for (chunk_index, chunk) in records.chunks(batch_size.max(1)).enumerate() {
        let mut docs = Vec::with_capacity(chunk.len());
        for record in chunk {
            match StoredDocument::from_record(record) {
                Ok(doc) => docs.push(doc),
                Err(e) => {
                    warn!(collection = collection.label(), id = record.id(), error = %e, "record not serializable");
                    report.failures.push(WriteFailure {
                        collection,
                        chunk: chunk_index,
                        id: Some(record.id().to_string()),
                        error: e.to_string(),
                    });
                }
            }
        }

        match store.upsert_many(collection, &docs).await {
            Ok(result) => {
                report.persisted += result.written;
                for failed in result.failed {
                    warn!(collection = collection.label(), chunk = chunk_index, id = %failed.id, error = %failed.error, "document write failed");
                    report.failures.push(WriteFailure {
                        collection,
                        chunk: chunk_index,
                        id: Some(failed.id),
                        error: failed.error,
                    });
                }
                debug!(collection = collection.label(), chunk = chunk_index, written = result.written, "chunk persisted");
            }
            Err(e) => {
                error!(collection = collection.label(), chunk = chunk_index, records = docs.len(), error = %e, "chunk write failed");
                report.failures.push(WriteFailure {
                    collection,
                    chunk: chunk_index,
                    id: None,
                    error: e.to_string(),
                });
            }
        }

        attempted += chunk.len() as u64;
        progress.report(IngestProgressEvent::Persisting {
            collection,
            n: attempted,
            total,
        });
    }

    report
}
