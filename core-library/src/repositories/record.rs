//! Per-track play record store.

use std::sync::Arc;

use bridge_traits::{CollectionId, KeyedBlobStore, TrackKey};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::codec::{decode_record, encode_record};
use crate::error::Result;
use crate::models::{PlayRecord, CURRENT_RECORD_VERSION};

/// Reads and writes [`PlayRecord`]s through the host blob store.
///
/// Every write, including read-modify-write updates, holds one store-wide
/// lock so concurrent merges cannot interleave. Stores created with
/// [`RecordStore::with_collection`] share that lock.
#[derive(Clone)]
pub struct RecordStore {
    blobs: Arc<dyn KeyedBlobStore>,
    collection: CollectionId,
    write_lock: Arc<Mutex<()>>,
}

impl RecordStore {
    /// Store over the current play-history collection.
    pub fn new(blobs: Arc<dyn KeyedBlobStore>) -> Self {
        Self {
            blobs,
            collection: CollectionId::PlayHistory,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Same backing store and write lock, different collection.
    pub fn with_collection(&self, collection: CollectionId) -> Self {
        Self {
            blobs: Arc::clone(&self.blobs),
            collection,
            write_lock: Arc::clone(&self.write_lock),
        }
    }

    pub fn collection(&self) -> CollectionId {
        self.collection
    }

    /// Keys with a stored blob in this store's collection.
    pub async fn known_keys(&self) -> Result<Vec<TrackKey>> {
        Ok(self.blobs.known_keys(self.collection).await?)
    }

    /// Whether the collection holds blobs no library item maps to.
    pub async fn has_orphaned_data(&self) -> Result<bool> {
        Ok(self.blobs.has_orphaned_data(self.collection).await?)
    }

    /// Read the record stored under `key`.
    ///
    /// Missing, unreadable or corrupt blobs all yield the empty record.
    pub async fn get(&self, key: TrackKey) -> PlayRecord {
        match self.blobs.get_blob(self.collection, key).await {
            Ok(Some(bytes)) => decode_record(&bytes),
            Ok(None) => PlayRecord::empty(),
            Err(e) => {
                warn!(track_key = %key, collection = %self.collection, error = %e, "Failed to read play record");
                PlayRecord::empty()
            }
        }
    }

    /// Write `record` under `key`, stamping the current version.
    #[instrument(skip(self, record), fields(track_key = %key, collection = %self.collection))]
    pub async fn set(&self, key: TrackKey, mut record: PlayRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        record.version = CURRENT_RECORD_VERSION;
        self.write_unlocked(key, &record).await
    }

    /// Read, modify and write back the record under the write lock.
    ///
    /// The closure decides whether anything changed; unchanged records are
    /// not written. Returns the resulting record.
    pub async fn update<F>(&self, key: TrackKey, mutate: F) -> Result<PlayRecord>
    where
        F: FnOnce(&mut PlayRecord) -> bool + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut record = self.get(key).await;
        if mutate(&mut record) {
            record.version = CURRENT_RECORD_VERSION;
            self.write_unlocked(key, &record).await?;
        }
        Ok(record)
    }

    /// Empty the remote history of `key`, leaving local plays untouched.
    ///
    /// Returns whether anything was removed.
    pub async fn clear_remote(&self, key: TrackKey) -> Result<bool> {
        let mut cleared = false;
        self.update(key, |record| {
            cleared = record.clear_remote();
            cleared
        })
        .await?;
        Ok(cleared)
    }

    async fn write_unlocked(&self, key: TrackKey, record: &PlayRecord) -> Result<()> {
        let bytes = encode_record(record)?;
        self.blobs.set_blob(self.collection, key, &bytes).await?;
        debug!(
            local = record.local_play_times.len(),
            remote = record.remote_play_times.len(),
            "Stored play record"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        pub Blobs {}

        #[async_trait]
        impl KeyedBlobStore for Blobs {
            async fn get_blob(&self, collection: CollectionId, key: TrackKey) -> BridgeResult<Option<Vec<u8>>>;
            async fn set_blob(&self, collection: CollectionId, key: TrackKey, bytes: &[u8]) -> BridgeResult<()>;
            async fn has_orphaned_data(&self, collection: CollectionId) -> BridgeResult<bool>;
            async fn known_keys(&self, collection: CollectionId) -> BridgeResult<Vec<TrackKey>>;
            fn dispatch_refresh(&self, collection: CollectionId, keys: &[TrackKey]);
        }
    }

    #[derive(Default)]
    struct MemoryBlobs {
        blobs: std::sync::Mutex<HashMap<(CollectionId, TrackKey), Vec<u8>>>,
    }

    #[async_trait]
    impl KeyedBlobStore for MemoryBlobs {
        async fn get_blob(&self, c: CollectionId, k: TrackKey) -> BridgeResult<Option<Vec<u8>>> {
            Ok(self.blobs.lock().unwrap().get(&(c, k)).cloned())
        }
        async fn set_blob(&self, c: CollectionId, k: TrackKey, b: &[u8]) -> BridgeResult<()> {
            self.blobs.lock().unwrap().insert((c, k), b.to_vec());
            Ok(())
        }
        async fn has_orphaned_data(&self, _: CollectionId) -> BridgeResult<bool> {
            Ok(false)
        }
        async fn known_keys(&self, c: CollectionId) -> BridgeResult<Vec<TrackKey>> {
            Ok(self
                .blobs
                .lock()
                .unwrap()
                .keys()
                .filter(|(col, _)| *col == c)
                .map(|(_, k)| *k)
                .collect())
        }
        fn dispatch_refresh(&self, _: CollectionId, _: &[TrackKey]) {}
    }

    #[tokio::test]
    async fn test_get_unknown_key_is_empty() {
        let store = RecordStore::new(Arc::new(MemoryBlobs::default()));
        assert_eq!(store.get(TrackKey(7)).await, PlayRecord::empty());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = RecordStore::new(Arc::new(MemoryBlobs::default()));
        let record = PlayRecord {
            version: 0,
            local_play_times: vec![10, 20],
            remote_play_times: vec![15],
        };
        store.set(TrackKey(1), record.clone()).await.unwrap();

        let loaded = store.get(TrackKey(1)).await;
        assert_eq!(loaded.version, CURRENT_RECORD_VERSION);
        assert_eq!(loaded.local_play_times, record.local_play_times);
        assert_eq!(loaded.remote_play_times, record.remote_play_times);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store = RecordStore::new(Arc::new(MemoryBlobs::default()));
        let legacy = store.with_collection(CollectionId::LegacyPlayHistory);
        let mut record = PlayRecord::empty();
        record.push_local(99);
        legacy.set(TrackKey(3), record).await.unwrap();

        assert!(store.get(TrackKey(3)).await.is_empty());
        assert_eq!(legacy.get(TrackKey(3)).await.local_play_times, vec![99]);
    }

    #[tokio::test]
    async fn test_update_skips_write_when_unchanged() {
        let mut blobs = MockBlobs::new();
        blobs.expect_get_blob().returning(|_, _| Ok(None));
        blobs.expect_set_blob().never();

        let store = RecordStore::new(Arc::new(blobs));
        let record = store.update(TrackKey(1), |_| false).await.unwrap();
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn test_clear_remote_keeps_local() {
        let store = RecordStore::new(Arc::new(MemoryBlobs::default()));
        store
            .set(
                TrackKey(5),
                PlayRecord {
                    version: CURRENT_RECORD_VERSION,
                    local_play_times: vec![1, 2],
                    remote_play_times: vec![3],
                },
            )
            .await
            .unwrap();

        assert!(store.clear_remote(TrackKey(5)).await.unwrap());
        assert!(!store.clear_remote(TrackKey(5)).await.unwrap());
        let record = store.get(TrackKey(5)).await;
        assert_eq!(record.local_play_times, vec![1, 2]);
        assert!(record.remote_play_times.is_empty());
    }

    #[tokio::test]
    async fn test_read_failure_yields_empty_record() {
        let mut blobs = MockBlobs::new();
        blobs
            .expect_get_blob()
            .returning(|_, _| Err(BridgeError::StorageError("disk gone".into())));

        let store = RecordStore::new(Arc::new(blobs));
        assert_eq!(store.get(TrackKey(1)).await, PlayRecord::empty());
    }

    #[tokio::test]
    async fn test_corrupt_blob_yields_empty_record() {
        let mut blobs = MockBlobs::new();
        blobs
            .expect_get_blob()
            .returning(|_, _| Ok(Some(vec![1, 0, 0, 0, 9])));

        let store = RecordStore::new(Arc::new(blobs));
        assert_eq!(store.get(TrackKey(1)).await, PlayRecord::empty());
    }

    #[tokio::test]
    async fn test_write_failure_propagates() {
        let mut blobs = MockBlobs::new();
        blobs
            .expect_set_blob()
            .returning(|_, _, _| Err(BridgeError::StorageError("read-only".into())));

        let store = RecordStore::new(Arc::new(blobs));
        assert!(store.set(TrackKey(1), PlayRecord::empty()).await.is_err());
    }
}
