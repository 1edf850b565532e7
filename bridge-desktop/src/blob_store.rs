//! Keyed blob storage using SQLite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{CollectionId, KeyedBlobStore},
    TrackKey,
};
use sqlx::{sqlite::SqlitePool, Row};
use std::path::Path;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::sqlite::{connect_file, connect_memory, unix_now};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS blobs (
        collection TEXT NOT NULL,
        key INTEGER NOT NULL,
        data BLOB NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (collection, key)
    )
"#;

const REFRESH_CHANNEL_CAPACITY: usize = 64;

/// Listener notification emitted by [`SqliteBlobStore::dispatch_refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshEvent {
    pub collection: CollectionId,
    pub keys: Vec<TrackKey>,
}

/// SQLite-backed [`KeyedBlobStore`].
///
/// Refresh notifications are broadcast to every [`subscribe`](Self::subscribe)r.
/// The store has no view of the host library, so
/// [`has_orphaned_data`](KeyedBlobStore::has_orphaned_data) reports whether
/// the collection holds any data at all.
pub struct SqliteBlobStore {
    pool: SqlitePool,
    refresh_tx: broadcast::Sender<RefreshEvent>,
}

impl SqliteBlobStore {
    pub async fn new(db_path: &Path) -> Result<Self> {
        Self::init(connect_file(db_path).await?).await
    }

    /// Create an in-memory store (for testing)
    pub async fn in_memory() -> Result<Self> {
        Self::init(connect_memory().await?).await
    }

    async fn init(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to create table: {}", e)))?;

        let (refresh_tx, _) = broadcast::channel(REFRESH_CHANNEL_CAPACITY);
        debug!("Initialized blob store");
        Ok(Self { pool, refresh_tx })
    }

    /// Receive every refresh dispatched after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.refresh_tx.subscribe()
    }

    // Keys are stored bit-for-bit in SQLite's signed integer column.
    fn encode_key(key: TrackKey) -> i64 {
        key.0 as i64
    }

    fn decode_key(raw: i64) -> TrackKey {
        TrackKey(raw as u64)
    }
}

#[async_trait]
impl KeyedBlobStore for SqliteBlobStore {
    async fn get_blob(&self, collection: CollectionId, key: TrackKey) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT data FROM blobs WHERE collection = ? AND key = ?")
            .bind(collection.as_str())
            .bind(Self::encode_key(key))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to read blob: {}", e)))?;

        Ok(row.map(|row| row.get::<Vec<u8>, _>(0)))
    }

    async fn set_blob(&self, collection: CollectionId, key: TrackKey, bytes: &[u8]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO blobs (collection, key, data, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(collection, key) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(collection.as_str())
        .bind(Self::encode_key(key))
        .bind(bytes)
        .bind(unix_now())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::StorageError(format!("Failed to write blob: {}", e)))?;

        trace!(%collection, track_key = %key, bytes = bytes.len(), "Stored blob");
        Ok(())
    }

    async fn has_orphaned_data(&self, collection: CollectionId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM blobs WHERE collection = ? LIMIT 1")
            .bind(collection.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to query blobs: {}", e)))?;
        Ok(row.is_some())
    }

    async fn known_keys(&self, collection: CollectionId) -> Result<Vec<TrackKey>> {
        let rows = sqlx::query("SELECT key FROM blobs WHERE collection = ? ORDER BY key")
            .bind(collection.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to list keys: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| Self::decode_key(row.get::<i64, _>(0)))
            .collect())
    }

    fn dispatch_refresh(&self, collection: CollectionId, keys: &[TrackKey]) {
        // No subscribers is fine.
        let _ = self.refresh_tx.send(RefreshEvent {
            collection,
            keys: keys.to_vec(),
        });
        debug!(%collection, count = keys.len(), "Dispatched refresh");
    }
}
