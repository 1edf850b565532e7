//! In-memory collaborators for engine tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    ArtistMatch, CollectionId, FieldPatterns, FixedClock, HttpClient, HttpRequest, HttpResponse,
    KeyScheme, KeyedBlobStore, LibraryQuery, LibrarySearch, MainThreadDispatch, MainThreadTask,
    MetadataReader, SettingsStore, TrackIdentity, TrackKey, TrackMetadata, TrackRef,
};
use bytes::Bytes;
use core_library::{ArtistStore, PlayRecord, RecordStore};
use core_metadata::{fingerprint, LastFmClient};
use core_runtime::{ConfigStore, EngineTuning, PlaycountConfig, SharedConfig};
use core_sync::{EngineDependencies, ReconciliationEngine};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub const T0: i64 = 1_700_000_000;

// ============================================================================
// Storage
// ============================================================================

#[derive(Default)]
pub struct MemoryBlobs {
    blobs: Mutex<HashMap<(CollectionId, TrackKey), Vec<u8>>>,
    refreshes: Mutex<Vec<Vec<TrackKey>>>,
}

impl MemoryBlobs {
    /// Every refresh batch delivered so far.
    pub fn refreshes(&self) -> Vec<Vec<TrackKey>> {
        self.refreshes.lock().clone()
    }

    pub fn refreshed_keys(&self) -> Vec<TrackKey> {
        let mut keys: Vec<TrackKey> = self.refreshes.lock().iter().flatten().copied().collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

#[async_trait]
impl KeyedBlobStore for MemoryBlobs {
    async fn get_blob(&self, collection: CollectionId, key: TrackKey) -> BridgeResult<Option<Vec<u8>>> {
        Ok(self.blobs.lock().get(&(collection, key)).cloned())
    }

    async fn set_blob(&self, collection: CollectionId, key: TrackKey, bytes: &[u8]) -> BridgeResult<()> {
        self.blobs.lock().insert((collection, key), bytes.to_vec());
        Ok(())
    }

    async fn has_orphaned_data(&self, collection: CollectionId) -> BridgeResult<bool> {
        Ok(self.blobs.lock().keys().any(|(c, _)| *c == collection))
    }

    async fn known_keys(&self, collection: CollectionId) -> BridgeResult<Vec<TrackKey>> {
        Ok(self
            .blobs
            .lock()
            .keys()
            .filter(|(c, _)| *c == collection)
            .map(|(_, key)| *key)
            .collect())
    }

    fn dispatch_refresh(&self, _collection: CollectionId, keys: &[TrackKey]) {
        let mut sorted = keys.to_vec();
        sorted.sort();
        self.refreshes.lock().push(sorted);
    }
}

#[derive(Default)]
pub struct MemorySettings {
    strings: Mutex<HashMap<String, String>>,
    bools: Mutex<HashMap<String, bool>>,
    ints: Mutex<HashMap<String, i64>>,
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.strings.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.strings.lock().get(key).cloned())
    }

    async fn set_bool(&self, key: &str, value: bool) -> BridgeResult<()> {
        self.bools.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn get_bool(&self, key: &str) -> BridgeResult<Option<bool>> {
        Ok(self.bools.lock().get(key).copied())
    }

    async fn set_i64(&self, key: &str, value: i64) -> BridgeResult<()> {
        self.ints.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn get_i64(&self, key: &str) -> BridgeResult<Option<i64>> {
        Ok(self.ints.lock().get(key).copied())
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.strings.lock().remove(key);
        self.bools.lock().remove(key);
        self.ints.lock().remove(key);
        Ok(())
    }
}

// ============================================================================
// Library
// ============================================================================

pub fn song(artist: &str, album: &str, title: &str) -> TrackMetadata {
    TrackMetadata {
        artist: artist.to_string(),
        album: album.to_string(),
        title: title.to_string(),
        length_secs: 200.0,
        ..TrackMetadata::default()
    }
}

#[derive(Default)]
pub struct FakeLibrary {
    tracks: Mutex<Vec<(TrackRef, TrackMetadata)>>,
}

impl FakeLibrary {
    pub fn add(&self, location: &str, metadata: TrackMetadata) -> TrackRef {
        let track = TrackRef::new(location, 0);
        self.tracks.lock().push((track.clone(), metadata));
        track
    }

    pub fn metadata(&self, track: &TrackRef) -> Option<TrackMetadata> {
        self.tracks
            .lock()
            .iter()
            .find(|(t, _)| t == track)
            .map(|(_, m)| m.clone())
    }
}

fn escaped(value: &str) -> String {
    value.replace('"', "$char(34)")
}

#[async_trait]
impl LibrarySearch for FakeLibrary {
    async fn search(&self, query: &LibraryQuery) -> BridgeResult<Vec<TrackRef>> {
        let tracks = self.tracks.lock();
        Ok(tracks
            .iter()
            .filter(|(_, m)| {
                let artist_ok = match &query.artist {
                    ArtistMatch::Exact(artist) => &m.artist == artist,
                    ArtistMatch::Escaped(artist) => &escaped(&m.artist) == artist,
                };
                artist_ok
                    && escaped(&m.title) == query.title
                    && query.album.as_ref().map_or(true, |album| &escaped(&m.album) == album)
            })
            .map(|(t, _)| t.clone())
            .collect())
    }

    async fn all_tracks(&self) -> BridgeResult<Vec<TrackRef>> {
        Ok(self.tracks.lock().iter().map(|(t, _)| t.clone()).collect())
    }
}

#[async_trait]
impl MetadataReader for FakeLibrary {
    async fn read(&self, track: &TrackRef, _patterns: &FieldPatterns) -> BridgeResult<TrackMetadata> {
        self.metadata(track)
            .ok_or_else(|| BridgeError::NotAvailable(format!("No such track: {}", track.location)))
    }
}

/// Keys derived from the tag fields, one namespace per scheme.
pub struct FakeIdentity;

impl TrackIdentity for FakeIdentity {
    fn compute_key(&self, metadata: &TrackMetadata, _track: &TrackRef, scheme: KeyScheme) -> Option<TrackKey> {
        if metadata.title.is_empty() {
            return None;
        }
        let text = match scheme {
            KeyScheme::Current => format!("c|{}|{}|{}", metadata.artist, metadata.album, metadata.title),
            KeyScheme::Legacy => format!("l|{}|{}|{}", metadata.artist, metadata.album, metadata.title),
            KeyScheme::Artist => format!("a|{}", metadata.artist.to_lowercase()),
        };
        Some(TrackKey(fingerprint(&text)))
    }
}

// ============================================================================
// Remote
// ============================================================================

/// Answers by URL substring and records every request.
#[derive(Default)]
pub struct RoutedHttp {
    routes: Mutex<Vec<(String, Value)>>,
    urls: Mutex<Vec<String>>,
    hold_recent: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl RoutedHttp {
    /// Answer URLs containing every fragment of `pattern` (split on `|`)
    /// with `body`. Earlier routes win.
    pub fn route(&self, pattern: &str, body: Value) {
        self.routes.lock().push((pattern.to_string(), body));
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }

    pub fn count(&self, fragment: &str) -> usize {
        self.urls.lock().iter().filter(|u| u.contains(fragment)).count()
    }

    /// Block recent-track requests until [`release_recent`](Self::release_recent).
    pub fn hold_recent(&self) {
        self.hold_recent.store(true, Ordering::SeqCst);
    }

    pub async fn recent_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release_recent(&self) {
        self.hold_recent.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }
}

#[async_trait]
impl HttpClient for RoutedHttp {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.urls.lock().push(request.url.clone());
        if request.url.contains("getRecentTracks") && self.hold_recent.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }

        let body = self
            .routes
            .lock()
            .iter()
            .find(|(pattern, _)| pattern.split('|').all(|part| request.url.contains(part)))
            .map(|(_, body)| body.clone())
            .unwrap_or_else(|| json!({}));

        Ok(HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        })
    }
}

pub fn scrobble(title: &str, album: &str, uts: i64) -> Value {
    json!({
        "name": title,
        "album": { "#text": album },
        "date": { "uts": uts.to_string() },
    })
}

pub fn track_page(entries: Vec<Value>) -> Value {
    json!({ "trackscrobbles": { "track": entries } })
}

pub fn recent(artist: &str, title: &str, album: &str, uts: i64) -> Value {
    json!({
        "name": title,
        "artist": { "#text": artist },
        "album": { "#text": album },
        "date": { "uts": uts.to_string() },
    })
}

pub fn recent_page(entries: Vec<Value>) -> Value {
    json!({ "recenttracks": { "track": entries } })
}

// ============================================================================
// Main thread
// ============================================================================

/// Queues main-thread work until the test runs it.
#[derive(Default)]
pub struct CollectingDispatcher {
    tasks: Mutex<Vec<MainThreadTask>>,
}

impl CollectingDispatcher {
    pub async fn run_pending(&self) {
        loop {
            let tasks: Vec<MainThreadTask> = std::mem::take(&mut *self.tasks.lock());
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                task.await;
            }
        }
    }
}

impl MainThreadDispatch for CollectingDispatcher {
    fn run_on_main(&self, task: MainThreadTask) {
        self.tasks.lock().push(task);
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Remote lookup enabled, no automatic sweeps, first fetch delayed.
pub fn remote_config() -> PlaycountConfig {
    let mut config = PlaycountConfig::builder()
        .enable_remote_lookup(true)
        .remote_username("listener")
        .api_key("k3y")
        .cache_size(0)
        .build()
        .expect("valid config");
    config.auto_backfill = false;
    config.delay_first_fetch = true;
    config
}

/// Default tuning without pacing delays.
pub fn fast_tuning() -> EngineTuning {
    EngineTuning {
        manual_delay: Duration::ZERO,
        sweep_delay: Duration::ZERO,
        ..EngineTuning::default()
    }
}

pub struct Harness {
    pub engine: ReconciliationEngine,
    pub http: Arc<RoutedHttp>,
    pub blobs: Arc<MemoryBlobs>,
    pub library: Arc<FakeLibrary>,
    pub dispatcher: Arc<CollectingDispatcher>,
    pub config: SharedConfig,
    pub config_store: Arc<ConfigStore>,
    pub records: RecordStore,
    pub artists: ArtistStore,
}

impl Harness {
    pub fn new(config: PlaycountConfig) -> Self {
        Self::with_tuning(config, fast_tuning())
    }

    pub fn with_tuning(config: PlaycountConfig, tuning: EngineTuning) -> Self {
        let http = Arc::new(RoutedHttp::default());
        let blobs = Arc::new(MemoryBlobs::default());
        let library = Arc::new(FakeLibrary::default());
        let dispatcher = Arc::new(CollectingDispatcher::default());
        let settings: Arc<dyn SettingsStore> = Arc::new(MemorySettings::default());
        let config = config.into_shared();
        let config_store = Arc::new(ConfigStore::new(settings));
        let records = RecordStore::new(blobs.clone());
        let artists = ArtistStore::new(blobs.clone());
        let client = Arc::new(LastFmClient::new(http.clone(), config.clone(), "playcount-tests/1.0"));

        let engine = ReconciliationEngine::new(EngineDependencies {
            config: config.clone(),
            config_store: config_store.clone(),
            records: records.clone(),
            artists: artists.clone(),
            client,
            identity: Arc::new(FakeIdentity),
            reader: library.clone(),
            library: library.clone(),
            blobs: blobs.clone(),
            dispatcher: dispatcher.clone(),
            clock: Arc::new(FixedClock(T0)),
            tuning,
            worker_count: 2,
        });

        Self {
            engine,
            http,
            blobs,
            library,
            dispatcher,
            config,
            config_store,
            records,
            artists,
        }
    }

    pub fn key(&self, metadata: &TrackMetadata, scheme: KeyScheme) -> TrackKey {
        FakeIdentity
            .compute_key(metadata, &TrackRef::new("", 0), scheme)
            .expect("keyable metadata")
    }

    pub async fn seed(&self, key: TrackKey, local: &[i64], remote: &[i64]) {
        let record = PlayRecord {
            local_play_times: local.to_vec(),
            remote_play_times: remote.to_vec(),
            ..PlayRecord::empty()
        };
        self.records.set(key, record).await.expect("seed record");
    }
}
