//! Record retrieval by collection and id.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::models::Collection;
use crate::store::{DocumentStore, SqliteStore};

pub async fn get_record(
    store: &dyn DocumentStore,
    collection: Collection,
    id: &str,
) -> Result<serde_json::Value> {
    match store.get(collection, id).await? {
        Some(body) => Ok(body),
        None => bail!("{} record not found: {}", collection.label(), id),
    }
}

/// CLI entry point: print the stored document as pretty JSON.
pub async fn run_get(config: &Config, collection: &str, id: &str) -> Result<()> {
    let Some(collection) = Collection::from_cli_name(collection) else {
        bail!(
            "Unknown collection: '{}'. Available: speeches, agenda, comments",
            collection
        );
    };

    let store = SqliteStore::open(config).await?;
    let record = get_record(&store, collection, id).await;
    store.close().await;

    println!("{}", serde_json::to_string_pretty(&record?)?);
    Ok(())
}
