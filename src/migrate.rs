use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::{CollectionsConfig, Config};
use crate::db;
use crate::models::Collection;
use crate::store::StoreError;

/// Create the schema for `plenary init`.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_tables(&pool, &config.collections).await?;
    pool.close().await;
    Ok(())
}

/// One document table per collection, plus an `updated_at` index.
/// Safe to run repeatedly.
pub async fn create_tables(
    pool: &SqlitePool,
    collections: &CollectionsConfig,
) -> Result<(), StoreError> {
    for collection in Collection::ALL {
        let table = collections.name(collection);

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                body_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#
        ))
        .execute(pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_updated_at ON {table}(updated_at DESC)"
        ))
        .execute(pool)
        .await?;
    }

    Ok(())
}
