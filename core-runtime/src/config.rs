//! # Core Configuration Module
//!
//! Wires the host bridges the play-history core depends on.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance. It enforces fail-fast validation so every required bridge is
//! present before the service starts.
//!
//! ## Required Dependencies
//!
//! - `MetadataReader` - Formatted tags and host play statistics
//! - `LibrarySearch` - Resolving remote scrobbles to library tracks
//! - `MainThreadDispatch` - Refresh notifications and settings writes
//! - `KeyedBlobStore` / `SettingsStore` - Persistence
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `HttpClient` (desktop default: reqwest)
//! - `TrackIdentity` (desktop default: sha2 over canonical tags)
//! - `Clock` (default: system clock)
//!
//! When the `desktop-shims` feature is enabled and a `database_path` is set,
//! SQLite-backed blob and settings stores are created automatically if not
//! provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/playcount.db")
//!     .metadata_reader(Arc::new(HostReader))
//!     .library_search(Arc::new(HostSearch))
//!     .dispatcher(Arc::new(HostDispatcher))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    Clock, HttpClient, KeyedBlobStore, LibrarySearch, MainThreadDispatch, MetadataReader,
    SettingsStore, SystemClock, TrackIdentity,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default number of concurrent fetch workers.
pub const DEFAULT_WORKER_COUNT: usize = 4;
const MAX_WORKER_COUNT: usize = 16;

/// Pacing and batching knobs of the reconciliation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineTuning {
    /// Pending refresh keys that trigger an early flush.
    pub refresh_batch_threshold: usize,
    /// Manual fetches issued before pacing starts.
    pub manual_burst: usize,
    pub manual_delay: Duration,
    /// Pause between fetches dispatched by a backfill sweep.
    pub sweep_delay: Duration,
    pub max_manual_selection: usize,
    /// Upper bound on fetches queued by one sweep.
    pub max_sweep_fetches: usize,
    /// Playback position at which a delayed first fetch fires.
    pub first_fetch_position: Duration,
    /// New tracks between automatic backward sweeps.
    pub backward_sweep_every: u32,
    /// New tracks between automatic forward sweeps.
    pub forward_sweep_every: u32,
    /// A sweep candidate this much newer than the last known remote play
    /// still needs a fetch.
    pub sweep_grace_secs: i64,
    /// Tracks shorter than this are never scrobbled.
    pub min_track_length_secs: f64,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            refresh_batch_threshold: 25,
            manual_burst: 5,
            manual_delay: Duration::from_millis(200),
            sweep_delay: Duration::from_millis(300),
            max_manual_selection: 50,
            max_sweep_fetches: 250,
            first_fetch_position: Duration::from_secs(2),
            backward_sweep_every: 12,
            forward_sweep_every: 5,
            sweep_grace_secs: 60,
            min_track_length_secs: 30.0,
        }
    }
}

impl EngineTuning {
    pub fn validate(&self) -> Result<()> {
        if self.refresh_batch_threshold == 0 {
            return Err(Error::Config(
                "Refresh batch threshold must be greater than 0".to_string(),
            ));
        }
        if self.max_manual_selection == 0 {
            return Err(Error::Config(
                "Manual selection limit must be greater than 0".to_string(),
            ));
        }
        if self.backward_sweep_every == 0 || self.forward_sweep_every == 0 {
            return Err(Error::Config(
                "Sweep intervals must be greater than 0".to_string(),
            ));
        }
        if self.sweep_grace_secs < 0 {
            return Err(Error::Config("Sweep grace cannot be negative".to_string()));
        }
        Ok(())
    }
}

/// Bridges and process-level settings needed to start the core.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path of the SQLite database used by the desktop stores, if any.
    pub database_path: Option<PathBuf>,

    pub http_client: Arc<dyn HttpClient>,
    pub blob_store: Arc<dyn KeyedBlobStore>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub track_identity: Arc<dyn TrackIdentity>,
    pub metadata_reader: Arc<dyn MetadataReader>,
    pub library_search: Arc<dyn LibrarySearch>,
    pub dispatcher: Arc<dyn MainThreadDispatch>,
    pub clock: Arc<dyn Clock>,

    /// Size of the fetch worker pool.
    pub worker_count: usize,

    /// `User-Agent` header sent to the remote service.
    pub user_agent: String,

    pub tuning: EngineTuning,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("http_client", &"HttpClient { ... }")
            .field("blob_store", &"KeyedBlobStore { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field("track_identity", &"TrackIdentity { ... }")
            .field("metadata_reader", &"MetadataReader { ... }")
            .field("library_search", &"LibrarySearch { ... }")
            .field("dispatcher", &"MainThreadDispatch { ... }")
            .field("worker_count", &self.worker_count)
            .field("user_agent", &self.user_agent)
            .field("tuning", &self.tuning)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::Config(
                "Worker count must be greater than 0".to_string(),
            ));
        }

        if self.worker_count > MAX_WORKER_COUNT {
            return Err(Error::Config(format!(
                "Worker count exceeds maximum of {}",
                MAX_WORKER_COUNT
            )));
        }

        if self.user_agent.trim().is_empty() {
            return Err(Error::Config("User agent cannot be empty".to_string()));
        }

        self.tuning.validate()
    }
}

fn missing(capability: &str, message: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: message.to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    let client = bridge_desktop::ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HTTP client: {}", e)))?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(missing(
        "HttpClient",
        "No HTTP client implementation provided. \
         Desktop: ensure the 'desktop-shims' feature is enabled. \
         Other hosts: inject a platform-native adapter.",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_track_identity() -> Result<Arc<dyn TrackIdentity>> {
    let identity: Arc<dyn TrackIdentity> = Arc::new(bridge_desktop::HashingTrackIdentity::new());
    Ok(identity)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_track_identity() -> Result<Arc<dyn TrackIdentity>> {
    Err(missing(
        "TrackIdentity",
        "TrackIdentity implementation is required to address play records. \
         Desktop: ensure the 'desktop-shims' feature is enabled.",
    ))
}

/// Run an async store constructor to completion from sync code, whether or
/// not a Tokio runtime is already active on this thread.
#[cfg(feature = "desktop-shims")]
fn block_on_store<T, F, Fut>(init: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = bridge_traits::error::Result<T>>,
{
    use std::thread;
    use tokio::runtime::{Handle, Runtime};

    let run = move || -> Result<T> {
        let runtime = Runtime::new().map_err(|e| {
            Error::Internal(format!("Failed to create Tokio runtime for default store: {}", e))
        })?;
        runtime
            .block_on(init())
            .map_err(|e| Error::Internal(format!("Failed to initialize default store: {}", e)))
    };

    match Handle::try_current() {
        Ok(_) => thread::spawn(run).join().map_err(|_| {
            Error::Internal("Worker thread panicked while creating default store".to_string())
        })?,
        Err(_) => run(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_blob_store(database_path: Option<&PathBuf>) -> Result<Arc<dyn KeyedBlobStore>> {
    let path = database_path.cloned().ok_or_else(|| {
        missing(
            "KeyedBlobStore",
            "Set .database_path() to use the default SQLite blob store, or inject one.",
        )
    })?;
    let store = block_on_store(move || async move {
        bridge_desktop::SqliteBlobStore::new(&path).await
    })?;
    let store: Arc<dyn KeyedBlobStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_blob_store(
    _database_path: Option<&PathBuf>,
) -> Result<Arc<dyn KeyedBlobStore>> {
    Err(missing(
        "KeyedBlobStore",
        "KeyedBlobStore implementation is required for play-history records. \
         Desktop: enable 'desktop-shims' and set a database path.",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(
    database_path: Option<&PathBuf>,
) -> Result<Arc<dyn SettingsStore>> {
    let path = database_path
        .and_then(|p| p.parent().map(|parent| parent.join("settings.db")))
        .ok_or_else(|| {
            missing(
                "SettingsStore",
                "Set .database_path() to use the default SQLite settings store, or inject one.",
            )
        })?;
    let store = block_on_store(move || async move {
        bridge_desktop::SqliteSettingsStore::new(&path).await
    })?;
    let store: Arc<dyn SettingsStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(
    _database_path: Option<&PathBuf>,
) -> Result<Arc<dyn SettingsStore>> {
    Err(missing(
        "SettingsStore",
        "SettingsStore implementation is required for user preferences. \
         Desktop: enable 'desktop-shims' and set a database path.",
    ))
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    blob_store: Option<Arc<dyn KeyedBlobStore>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    track_identity: Option<Arc<dyn TrackIdentity>>,
    metadata_reader: Option<Arc<dyn MetadataReader>>,
    library_search: Option<Arc<dyn LibrarySearch>>,
    dispatcher: Option<Arc<dyn MainThreadDispatch>>,
    clock: Option<Arc<dyn Clock>>,
    worker_count: Option<usize>,
    user_agent: Option<String>,
    tuning: Option<EngineTuning>,
}

impl CoreConfigBuilder {
    /// Sets the database path used by the default SQLite stores.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn blob_store(mut self, store: Arc<dyn KeyedBlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn track_identity(mut self, identity: Arc<dyn TrackIdentity>) -> Self {
        self.track_identity = Some(identity);
        self
    }

    pub fn metadata_reader(mut self, reader: Arc<dyn MetadataReader>) -> Self {
        self.metadata_reader = Some(reader);
        self
    }

    pub fn library_search(mut self, search: Arc<dyn LibrarySearch>) -> Self {
        self.library_search = Some(search);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn MainThreadDispatch>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the number of concurrent fetch workers.
    ///
    /// Default: 4
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn tuning(mut self, tuning: EngineTuning) -> Self {
        self.tuning = Some(tuning);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapabilityMissing`] naming the first required bridge
    /// that was neither injected nor available as a platform default, and
    /// [`Error::Config`] when validation fails.
    pub fn build(self) -> Result<CoreConfig> {
        let metadata_reader = self.metadata_reader.ok_or_else(|| {
            missing(
                "MetadataReader",
                "The host must provide a MetadataReader to read track tags.",
            )
        })?;

        let library_search = self.library_search.ok_or_else(|| {
            missing(
                "LibrarySearch",
                "The host must provide a LibrarySearch to resolve remote scrobbles.",
            )
        })?;

        let dispatcher = self.dispatcher.ok_or_else(|| {
            missing(
                "MainThreadDispatch",
                "The host must provide a MainThreadDispatch for refresh notifications.",
            )
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let track_identity = match self.track_identity {
            Some(identity) => identity,
            None => provide_default_track_identity()?,
        };

        let blob_store = match self.blob_store {
            Some(store) => store,
            None => provide_default_blob_store(self.database_path.as_ref())?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(self.database_path.as_ref())?,
        };

        let config = CoreConfig {
            database_path: self.database_path,
            http_client,
            blob_store,
            settings_store,
            track_identity,
            metadata_reader,
            library_search,
            dispatcher,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            worker_count: self.worker_count.unwrap_or(DEFAULT_WORKER_COUNT),
            user_agent: self
                .user_agent
                .unwrap_or_else(|| format!("playcount/{}", env!("CARGO_PKG_VERSION"))),
            tuning: self.tuning.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}
