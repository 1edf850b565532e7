//! Artist side record store

use std::sync::Arc;

use bridge_traits::{CollectionId, KeyedBlobStore, TrackKey};
use tracing::warn;

use crate::codec::{decode_artist, encode_artist};
use crate::error::Result;
use crate::models::{ArtistRecord, CURRENT_ARTIST_VERSION};

/// Last-played timestamps per normalized artist key.
#[derive(Clone)]
pub struct ArtistStore {
    blobs: Arc<dyn KeyedBlobStore>,
}

impl ArtistStore {
    pub fn new(blobs: Arc<dyn KeyedBlobStore>) -> Self {
        Self { blobs }
    }

    pub async fn get(&self, key: TrackKey) -> ArtistRecord {
        match self.blobs.get_blob(CollectionId::Artist, key).await {
            Ok(Some(bytes)) => decode_artist(&bytes),
            Ok(None) => ArtistRecord::default(),
            Err(e) => {
                warn!(artist_key = %key, error = %e, "Failed to read artist record");
                ArtistRecord::default()
            }
        }
    }

    pub async fn set(&self, key: TrackKey, record: &ArtistRecord) -> Result<()> {
        self.blobs
            .set_blob(CollectionId::Artist, key, &encode_artist(record))
            .await?;
        Ok(())
    }

    /// Stamp `timestamp` as the artist's last play.
    pub async fn touch(&self, key: TrackKey, timestamp: i64) -> Result<()> {
        let record = ArtistRecord {
            version: CURRENT_ARTIST_VERSION,
            last_played: timestamp,
        };
        self.set(key, &record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use mockall::mock;
    use mockall::predicate::eq;

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

    #[tokio::test]
    async fn test_touch_writes_artist_collection() {
        let mut blobs = MockBlobs::new();
        blobs
            .expect_set_blob()
            .withf(|collection, key, bytes| {
                *collection == CollectionId::Artist
                    && *key == TrackKey(9)
                    && decode_artist(bytes).last_played == 1_234
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let store = ArtistStore::new(Arc::new(blobs));
        store.touch(TrackKey(9), 1_234).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_artist_is_default() {
        let mut blobs = MockBlobs::new();
        blobs
            .expect_get_blob()
            .with(eq(CollectionId::Artist), eq(TrackKey(2)))
            .returning(|_, _| Ok(None));

        let store = ArtistStore::new(Arc::new(blobs));
        assert_eq!(store.get(TrackKey(2)).await, ArtistRecord::default());
    }
}
