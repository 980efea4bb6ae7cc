//! Database statistics.
//!
//! Used by `plenary stats` to show how many records each collection holds
//! and when it was last written.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::Collection;

#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub collection: Collection,
    pub table: String,
    pub records: i64,
    /// Unix seconds of the most recent upsert, `None` for an empty table.
    pub last_write: Option<i64>,
}

pub async fn collection_stats(config: &Config, pool: &SqlitePool) -> Result<Vec<CollectionStats>> {
    let mut stats = Vec::new();
    for collection in Collection::ALL {
        let table = config.collections.name(collection);
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS records, MAX(updated_at) AS last_write FROM {}",
            table
        ))
        .fetch_one(pool)
        .await?;

        stats.push(CollectionStats {
            collection,
            table: table.to_string(),
            records: row.get("records"),
            last_write: row.get("last_write"),
        });
    }
    Ok(stats)
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::create_tables(&pool, &config.collections).await?;

    let stats = collection_stats(config, &pool).await?;
    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Plenary Database Stats");
    println!("========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!(
        "  {:<14} {:<14} {:>10}   {}",
        "COLLECTION", "TABLE", "RECORDS", "LAST WRITE"
    );
    println!("  {}", "-".repeat(60));
    for s in &stats {
        let last = s
            .last_write
            .map(format_ts_iso)
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {:<14} {:<14} {:>10}   {}",
            s.collection.label(),
            s.table,
            s.records,
            last
        );
    }
    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentStore, SqliteStore, StoredDocument};
    use tempfile::TempDir;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[tokio::test]
    async fn counts_each_collection() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("plenary.sqlite");
        let store = SqliteStore::open(&config).await.unwrap();
        store
            .upsert_many(
                Collection::Speeches,
                &[StoredDocument {
                    id: "ID1".into(),
                    body: serde_json::json!({"id": "ID1"}),
                }],
            )
            .await
            .unwrap();

        let stats = collection_stats(&config, store.pool()).await.unwrap();
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].collection, Collection::Speeches);
        assert_eq!(stats[0].records, 1);
        assert!(stats[0].last_write.is_some());
        assert_eq!(stats[1].table, "agenda");
        assert_eq!(stats[1].records, 0);
        assert_eq!(stats[1].last_write, None);
    }
}
