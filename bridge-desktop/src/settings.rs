//! Settings Store Implementation using SQLite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SettingsStore,
};
use sqlx::{sqlite::SqlitePool, Row};
use std::path::Path;
use tracing::{debug, error, trace};

use crate::sqlite::{connect_file, connect_memory, unix_now};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        value_type TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
"#;

/// The three value kinds the preferences layer persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Text,
    Flag,
    Integer,
}

impl ValueKind {
    fn as_str(self) -> &'static str {
        match self {
            ValueKind::Text => "string",
            ValueKind::Flag => "bool",
            ValueKind::Integer => "i64",
        }
    }
}

/// SQLite-backed [`SettingsStore`].
///
/// Values are stored as text together with their kind; reading a key back
/// as a different kind than it was written with is an error.
pub struct SqliteSettingsStore {
    pool: SqlitePool,
}

impl SqliteSettingsStore {
    pub async fn new(db_path: &Path) -> Result<Self> {
        Self::init(connect_file(db_path).await?).await
    }

    /// Create an in-memory settings store (for testing)
    pub async fn in_memory() -> Result<Self> {
        Self::init(connect_memory().await?).await
    }

    async fn init(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to create table: {}", e)))?;

        debug!("Initialized settings store");
        Ok(Self { pool })
    }

    async fn write(&self, key: &str, value: &str, kind: ValueKind) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, value_type, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                value_type = excluded.value_type,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(kind.as_str())
        .bind(unix_now())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::StorageError(format!("Failed to write setting {}: {}", key, e)))?;

        trace!(key, kind = kind.as_str(), "Stored setting");
        Ok(())
    }

    async fn read(&self, key: &str, kind: ValueKind) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value, value_type FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to read setting {}: {}", key, e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let stored_kind: String = row.get(1);
        if stored_kind != kind.as_str() {
            error!(key, expected = kind.as_str(), actual = %stored_kind, "Setting type mismatch");
            return Err(BridgeError::StorageError(format!(
                "Setting {} holds a {}, not a {}",
                key,
                stored_kind,
                kind.as_str()
            )));
        }

        Ok(Some(row.get(0)))
    }

    async fn read_parsed<T>(&self, key: &str, kind: ValueKind) -> Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.read(key, kind)
            .await?
            .map(|raw| {
                raw.parse::<T>().map_err(|e| {
                    BridgeError::StorageError(format!("Corrupt setting {}: {}", key, e))
                })
            })
            .transpose()
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.write(key, value, ValueKind::Text).await
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.read(key, ValueKind::Text).await
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.write(key, &value.to_string(), ValueKind::Flag).await
    }

    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.read_parsed(key, ValueKind::Flag).await
    }

    async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.write(key, &value.to_string(), ValueKind::Integer).await
    }

    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        self.read_parsed(key, ValueKind::Integer).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                BridgeError::StorageError(format!("Failed to delete setting {}: {}", key, e))
            })?;

        debug!(key, "Deleted setting");
        Ok(())
    }
}
