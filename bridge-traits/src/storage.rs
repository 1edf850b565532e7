//! Storage Abstractions
//!
//! Two kinds of persistence are consumed by the core:
//!
//! - [`KeyedBlobStore`]: opaque byte blobs addressed by a [`TrackKey`] inside a
//!   named [`CollectionId`]. The host index owns this storage; the core only
//!   knows how to encode and decode the blobs.
//! - [`SettingsStore`]: small typed preferences (flags, username, watermarks).

use async_trait::async_trait;
use std::fmt;

use crate::error::Result;
use crate::library::TrackKey;

/// Blob collections the core reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionId {
    /// Per-track play history under the current key scheme.
    PlayHistory,
    /// Play history under the obsolete key scheme, read only by migration.
    LegacyPlayHistory,
    /// Per-artist side records.
    Artist,
}

impl CollectionId {
    /// Stable name used by persistent adapters.
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionId::PlayHistory => "play_history",
            CollectionId::LegacyPlayHistory => "play_history_legacy",
            CollectionId::Artist => "artist",
        }
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyed blob storage provided by the host media index.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::{CollectionId, KeyedBlobStore};
///
/// async fn touch(store: &dyn KeyedBlobStore, key: TrackKey) -> Result<()> {
///     let bytes = store.get_blob(CollectionId::PlayHistory, key).await?;
///     store.set_blob(CollectionId::PlayHistory, key, &bytes.unwrap_or_default()).await?;
///     store.dispatch_refresh(CollectionId::PlayHistory, &[key]);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait KeyedBlobStore: Send + Sync {
    /// Read the blob stored under `key`, `None` when nothing was ever written.
    async fn get_blob(&self, collection: CollectionId, key: TrackKey) -> Result<Option<Vec<u8>>>;

    /// Replace the blob stored under `key`.
    async fn set_blob(&self, collection: CollectionId, key: TrackKey, bytes: &[u8]) -> Result<()>;

    /// Whether the collection still holds data that no longer maps to a
    /// library item.
    async fn has_orphaned_data(&self, collection: CollectionId) -> Result<bool>;

    /// Every key with a stored blob in the collection.
    async fn known_keys(&self, collection: CollectionId) -> Result<Vec<TrackKey>>;

    /// Notify listeners that the given keys changed.
    ///
    /// Must only be called from the main thread; callers route it through
    /// [`MainThreadDispatch`](crate::dispatch::MainThreadDispatch).
    fn dispatch_refresh(&self, collection: CollectionId, keys: &[TrackKey]);
}

/// Settings/preferences storage trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save_preference(store: &dyn SettingsStore) -> Result<()> {
///     store.set_string("playcount.remote_username", "listener").await?;
///     store.set_bool("playcount.compare_album", true).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Store an integer value
    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;

    /// Retrieve an integer value
    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;
}
