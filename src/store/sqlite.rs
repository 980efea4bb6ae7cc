//! SQLite-backed [`DocumentStore`].
//!
//! Each collection maps to a table
//! `(id TEXT PRIMARY KEY, body_json TEXT NOT NULL, updated_at INTEGER NOT NULL)`
//! named by `[collections]` in the config. Table names are validated as SQL
//! identifiers when the config loads, which is what makes interpolating
//! them into statements safe.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::config::{CollectionsConfig, Config};
use crate::db;
use crate::migrate;
use crate::models::Collection;

use super::{BulkWriteResult, DocumentStore, DocumentWriteError, StoreError, StoredDocument};

pub struct SqliteStore {
    pool: SqlitePool,
    tables: CollectionsConfig,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, tables: CollectionsConfig) -> Self {
        Self { pool, tables }
    }

    /// Connect using `[db]` and make sure every collection table exists.
    pub async fn open(config: &Config) -> Result<Self, StoreError> {
        let pool = db::connect(config).await?;
        migrate::create_tables(&pool, &config.collections).await?;
        Ok(Self::new(pool, config.collections.clone()))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn table(&self, collection: Collection) -> &str {
        self.tables.name(collection)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert_many(
        &self,
        collection: Collection,
        docs: &[StoredDocument],
    ) -> Result<BulkWriteResult, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO {} (id, body_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                body_json = excluded.body_json,
                updated_at = excluded.updated_at
            "#,
            self.table(collection)
        );
        let now = chrono::Utc::now().timestamp();

        let mut result = BulkWriteResult::default();
        let mut tx = self.pool.begin().await?;

        for doc in docs {
            let outcome = sqlx::query(&sql)
                .bind(&doc.id)
                .bind(doc.body.to_string())
                .bind(now)
                .execute(&mut *tx)
                .await;

            match outcome {
                Ok(_) => result.written += 1,
                Err(e) => {
                    debug!(id = %doc.id, error = %e, "document write rejected");
                    result.failed.push(DocumentWriteError {
                        id: doc.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tx.commit().await?;
        Ok(result)
    }

    async fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let sql = format!("SELECT body_json FROM {} WHERE id = ?", self.table(collection));
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let body: String = row.get("body_json");
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    async fn count(&self, collection: Collection) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table(collection));
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    async fn ids(&self, collection: Collection) -> Result<Vec<String>, StoreError> {
        let sql = format!("SELECT id FROM {} ORDER BY id", self.table(collection));
        let ids: Vec<String> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        Ok(ids)
    }
}
