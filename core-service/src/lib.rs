//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, blob and
//! settings storage, library access, main-thread dispatch) into the
//! play-history core. Desktop apps typically enable the `desktop-shims`
//! feature, which lets [`CoreConfig`] fall back to the `bridge-desktop`
//! adapters for anything the host does not inject.
//!
//! ```ignore
//! use core_service::{CoreConfig, PlaycountService};
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/playcount.db")
//!     .metadata_reader(reader)
//!     .library_search(search)
//!     .dispatcher(dispatcher)
//!     .build()?;
//! let service = PlaycountService::start(config).await?;
//! service.engine().on_playback_new_track(track);
//! service.shutdown().await;
//! ```

pub mod error;

pub use error::{CoreError, Result};

pub use core_runtime::logging::{init_logging, LoggingConfig};
pub use core_runtime::{CoreConfig, EngineTuning, PlaycountConfig};
pub use core_sync::{BatchReport, ReconciliationEngine, SweepOutcome, SweepReport};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::{MainThreadQueue, QueuedDispatcher};

use std::sync::Arc;

use core_library::{ArtistStore, RecordStore};
use core_metadata::{LastFmClient, RecentDirection};
use core_runtime::{ConfigStore, SharedConfig};
use core_sync::EngineDependencies;
use tracing::{info, instrument};

/// Primary façade exposed to host applications.
///
/// Owns the reconciliation engine and the persisted preferences. Clones
/// share the same engine.
#[derive(Clone)]
pub struct PlaycountService {
    engine: ReconciliationEngine,
    config: SharedConfig,
    config_store: Arc<ConfigStore>,
}

impl PlaycountService {
    /// Load preferences, build the engine and run startup maintenance.
    ///
    /// Startup migrates the legacy key space once, then queues a forward
    /// sweep when automatic backfill is on.
    #[instrument(skip_all)]
    pub async fn start(config: CoreConfig) -> Result<Self> {
        let config_store = Arc::new(ConfigStore::new(config.settings_store.clone()));
        let prefs = config_store.load().await?;
        prefs.validate()?;

        let legacy_migrated = prefs.legacy_migrated;
        let shared = prefs.into_shared();
        let client = Arc::new(LastFmClient::new(
            config.http_client.clone(),
            shared.clone(),
            config.user_agent.clone(),
        ));

        let engine = ReconciliationEngine::new(EngineDependencies {
            config: shared.clone(),
            config_store: config_store.clone(),
            records: RecordStore::new(config.blob_store.clone()),
            artists: ArtistStore::new(config.blob_store.clone()),
            client,
            identity: config.track_identity,
            reader: config.metadata_reader,
            library: config.library_search,
            blobs: config.blob_store,
            dispatcher: config.dispatcher,
            clock: config.clock,
            tuning: config.tuning,
            worker_count: config.worker_count,
        });

        let service = Self {
            engine,
            config: shared,
            config_store,
        };

        if !legacy_migrated {
            service.migrate_legacy_once().await?;
        }

        let auto_backfill = {
            let prefs = service.config.read();
            prefs.auto_backfill && prefs.is_remote_configured()
        };
        if auto_backfill {
            service.engine.schedule_backfill(RecentDirection::Forward);
        }

        info!(auto_backfill, "Play-history service started");
        Ok(service)
    }

    async fn migrate_legacy_once(&self) -> Result<()> {
        let legacy = self
            .engine
            .records()
            .with_collection(bridge_traits::CollectionId::LegacyPlayHistory);
        if legacy.has_orphaned_data().await? {
            let report = self.engine.migrate_legacy().await?;
            info!(
                examined = report.examined,
                transferred = report.transferred.len(),
                skipped = report.skipped,
                "Migrated legacy play records"
            );
        }

        self.config_store.mark_legacy_migrated().await?;
        self.config.write().legacy_migrated = true;
        Ok(())
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    /// Snapshot of the current preferences.
    pub fn config(&self) -> PlaycountConfig {
        self.config.read().clone()
    }

    /// Apply and persist new preferences.
    ///
    /// Sweep watermarks and the migration flag are owned by the engine and
    /// keep their current values.
    pub async fn update_config(&self, mut update: PlaycountConfig) -> Result<()> {
        {
            let current = self.config.read();
            update.latest_checked = current.latest_checked;
            update.earliest_checked = current.earliest_checked;
            update.legacy_migrated = current.legacy_migrated;
        }
        update.validate()?;
        self.config_store.save(&update).await?;

        let resized = self.config.read().cache_size != update.cache_size;
        if resized {
            self.engine.client().set_cache_size(update.cache_size);
        }
        *self.config.write() = update;
        Ok(())
    }

    /// Stop the engine and wait for in-flight work.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }
}
