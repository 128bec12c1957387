//! Durable persistence for cached file records.
//!
//! The table is a cache, not a journal: a missing row never proves that the
//! object is missing from the bucket.

use crate::meta::record::CachedFileRecord;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Error, Debug)]
pub enum MetaError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Only ever logged; readers fall back to the durable store instead.
    #[error("timed out waiting for the population lock on {key}")]
    LockTimeout { key: String },

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(&self, uri: &str) -> Result<Option<CachedFileRecord>, MetaError>;

    /// Insert-or-replace keyed by `record.uri`.
    async fn upsert(&self, record: &CachedFileRecord) -> Result<(), MetaError>;

    /// Deletes every listed URI in one batch; missing rows are ignored.
    async fn delete_many(&self, uris: &[String]) -> Result<u64, MetaError>;
}

#[derive(Debug, FromRow)]
struct FileRow {
    uri: String,
    filesize: i64,
    filemime: String,
    timestamp: i64,
}

impl From<FileRow> for CachedFileRecord {
    fn from(row: FileRow) -> Self {
        Self {
            uri: row.uri,
            size_bytes: row.filesize.max(0) as u64,
            content_type: row.filemime,
            timestamp: row.timestamp,
        }
    }
}

/// `gcsfs_file` table in SQLite.
pub struct SqliteRecordStore {
    pool: Arc<SqlitePool>,
}

impl SqliteRecordStore {
    pub async fn connect(url: &str) -> Result<Self, MetaError> {
        info!("Connecting to SQLite: {}", url);
        let pool = SqlitePoolOptions::new().max_connections(8).connect(url).await?;
        Self::new(Arc::new(pool)).await
    }

    pub async fn new(pool: Arc<SqlitePool>) -> Result<Self, MetaError> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), MetaError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS gcsfs_file (
                uri TEXT PRIMARY KEY NOT NULL,
                filesize INTEGER NOT NULL DEFAULT 0,
                filemime TEXT NOT NULL DEFAULT '',
                timestamp INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn select(&self, uri: &str) -> Result<Option<CachedFileRecord>, MetaError> {
        let row = sqlx::query_as::<_, FileRow>(
            "SELECT uri, filesize, filemime, timestamp FROM gcsfs_file WHERE uri = ?",
        )
        .bind(uri)
        .fetch_optional(self.pool.as_ref())
        .await?;
        Ok(row.map(CachedFileRecord::from))
    }

    async fn upsert(&self, record: &CachedFileRecord) -> Result<(), MetaError> {
        sqlx::query(
            "INSERT INTO gcsfs_file (uri, filesize, filemime, timestamp) VALUES (?, ?, ?, ?)
             ON CONFLICT(uri) DO UPDATE SET
                filesize = excluded.filesize,
                filemime = excluded.filemime,
                timestamp = excluded.timestamp",
        )
        .bind(&record.uri)
        .bind(record.size_bytes as i64)
        .bind(&record.content_type)
        .bind(record.timestamp)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn delete_many(&self, uris: &[String]) -> Result<u64, MetaError> {
        if uris.is_empty() {
            return Ok(0);
        }
        let mut query = QueryBuilder::<Sqlite>::new("DELETE FROM gcsfs_file WHERE uri IN (");
        let mut separated = query.separated(", ");
        for uri in uris {
            separated.push_bind(uri);
        }
        separated.push_unseparated(")");
        let result = query.build().execute(self.pool.as_ref()).await?;
        Ok(result.rows_affected())
    }
}

/// Simple in-memory store, for local development and tests.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<String, CachedFileRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn select(&self, uri: &str) -> Result<Option<CachedFileRecord>, MetaError> {
        Ok(self.records.read().await.get(uri).cloned())
    }

    async fn upsert(&self, record: &CachedFileRecord) -> Result<(), MetaError> {
        self.records
            .write()
            .await
            .insert(record.uri.clone(), record.clone());
        Ok(())
    }

    async fn delete_many(&self, uris: &[String]) -> Result<u64, MetaError> {
        let mut records = self.records.write().await;
        Ok(uris.iter().filter(|u| records.remove(*u).is_some()).count() as u64)
    }
}
