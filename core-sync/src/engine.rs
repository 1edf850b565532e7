//! # Reconciliation Engine
//!
//! Pulls remote scrobble history into the per-track play records.
//!
//! ## Overview
//!
//! The engine owns every moving part of reconciliation:
//! - Per-track pulls (`pull_for_track`) that fetch, match, dedup and merge
//! - Backfill sweeps over the global scrobble stream, one at a time
//! - Process-wide watermarks, persisted after each sweep
//! - Batched refresh notifications through the host's main thread
//! - Playback hooks that trigger pulls and periodic sweeps
//! - The two manual actions: force-fetch and clear remote history
//!
//! ## Time base
//!
//! Stored remote timestamps are shifted by `remote_time_offset_secs`.
//! Watermarks, cursors and candidate timestamps stay in remote time, so
//! the offset is removed again whenever a stored value is compared with
//! them.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let engine = ReconciliationEngine::new(deps);
//! engine.on_item_played(&track).await?;
//! engine.on_playback_new_track(track);
//! let outcome = engine.pull_recent_backfill(RecentDirection::Forward).await?;
//! engine.shutdown().await;
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bridge_traits::{
    ArtistMatch, Clock, CollectionId, KeyScheme, KeyedBlobStore, LibraryQuery, LibrarySearch,
    MainThreadDispatch, MetadataReader, TrackIdentity, TrackKey, TrackMetadata, TrackRef,
};
use core_library::migration::{apply_action, migrate_legacy_records, plan_transfer};
use core_library::{ArtistStore, MigrationReport, PlayRecord, RecordStore};
use core_metadata::{
    LastFmClient, MatchPolicy, MetadataError, RecentDirection, ScrobbleCandidate, TrackQuery,
};
use core_runtime::config::EngineTuning;
use core_runtime::settings::{ConfigStore, PlaycountConfig, SharedConfig};
use futures::future::join_all;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::rate_limit::RateLimiter;
use crate::refresh::PendingRefresh;
use crate::watermarks::Watermarks;
use crate::worker::WorkerPool;

/// Collaborators and settings the engine is built from.
pub struct EngineDependencies {
    pub config: SharedConfig,
    pub config_store: Arc<ConfigStore>,
    pub records: RecordStore,
    pub artists: ArtistStore,
    pub client: Arc<LastFmClient>,
    pub identity: Arc<dyn TrackIdentity>,
    pub reader: Arc<dyn MetadataReader>,
    pub library: Arc<dyn LibrarySearch>,
    pub blobs: Arc<dyn KeyedBlobStore>,
    pub dispatcher: Arc<dyn MainThreadDispatch>,
    pub clock: Arc<dyn Clock>,
    pub tuning: EngineTuning,
    pub worker_count: usize,
}

/// Statistics of a finished sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Candidates returned by the recent-tracks stream.
    pub candidates: usize,
    /// Distinct library tracks the candidates resolved to.
    pub resolved: usize,
    /// Tracks whose history was fetched.
    pub fetched: usize,
    /// Remote plays added across all fetched tracks.
    pub new_scrobbles: usize,
    /// Fetches that failed.
    pub failed: usize,
    /// Fetches dropped because the per-sweep cap was reached.
    pub deferred: usize,
}

/// Result of [`ReconciliationEngine::pull_recent_backfill`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Another sweep holds the sweep lock.
    AlreadyRunning,
    /// Remote lookup is disabled or the account is incomplete.
    NotConfigured,
    /// The engine is shutting down.
    Cancelled,
    Completed(SweepReport),
}

/// Result of [`ReconciliationEngine::fetch_selected`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub requested: usize,
    /// Distinct track keys after resolving the selection.
    pub resolved: usize,
    pub new_scrobbles: usize,
    /// One message per item that failed.
    pub failures: Vec<String>,
}

/// When a pulled track's listeners are told about the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshMode {
    /// Refresh right away if new plays arrived, otherwise batch.
    Immediate,
    /// Join the pending batch.
    Batched,
    /// The caller refreshes the whole selection itself.
    Deferred,
}

#[derive(Debug, Default)]
struct PlaybackState {
    current: Option<TrackRef>,
    first_fetch_done: bool,
    since_backward: u32,
    since_forward: u32,
}

struct PullOutcome {
    added: usize,
    last_remote: Option<i64>,
}

struct EngineInner {
    config: SharedConfig,
    config_store: Arc<ConfigStore>,
    records: RecordStore,
    artists: ArtistStore,
    client: Arc<LastFmClient>,
    identity: Arc<dyn TrackIdentity>,
    reader: Arc<dyn MetadataReader>,
    library: Arc<dyn LibrarySearch>,
    blobs: Arc<dyn KeyedBlobStore>,
    dispatcher: Arc<dyn MainThreadDispatch>,
    clock: Arc<dyn Clock>,
    tuning: EngineTuning,
    pool: WorkerPool,
    pending: PendingRefresh,
    watermarks: Mutex<Watermarks>,
    sweep_lock: tokio::sync::Mutex<()>,
    /// Set while a sweep holds `sweep_lock`; status reads never touch the lock.
    sweep_active: AtomicBool,
    quitting: CancellationToken,
    playback: Mutex<PlaybackState>,
}

/// Handle to the reconciliation engine. Cheap to clone.
#[derive(Clone)]
pub struct ReconciliationEngine {
    inner: Arc<EngineInner>,
}

impl ReconciliationEngine {
    pub fn new(deps: EngineDependencies) -> Self {
        let initial = {
            let config = deps.config.read();
            Watermarks::new(config.latest_checked, config.earliest_checked)
        };
        let threshold = deps.tuning.refresh_batch_threshold;
        let quitting = deps.client.shutdown_token();

        Self {
            inner: Arc::new(EngineInner {
                config: deps.config,
                config_store: deps.config_store,
                records: deps.records,
                artists: deps.artists,
                client: deps.client,
                identity: deps.identity,
                reader: deps.reader,
                library: deps.library,
                blobs: deps.blobs,
                dispatcher: deps.dispatcher,
                clock: deps.clock,
                tuning: deps.tuning,
                pool: WorkerPool::new(deps.worker_count),
                pending: PendingRefresh::new(threshold),
                watermarks: Mutex::new(initial),
                sweep_lock: tokio::sync::Mutex::new(()),
                sweep_active: AtomicBool::new(false),
                quitting,
                playback: Mutex::new(PlaybackState::default()),
            }),
        }
    }

    pub fn records(&self) -> &RecordStore {
        &self.inner.records
    }

    pub fn client(&self) -> &LastFmClient {
        &self.inner.client
    }

    /// Current sweep progress.
    pub fn watermarks(&self) -> Watermarks {
        *self.inner.watermarks.lock()
    }

    pub fn is_sweep_running(&self) -> bool {
        self.inner.sweep_active.load(Ordering::Acquire)
    }

    pub fn is_quitting(&self) -> bool {
        self.inner.quitting.is_cancelled()
    }

    /// Fetch and merge the remote history of one track.
    ///
    /// Returns how many remote plays were added. The key joins the pending
    /// refresh batch.
    pub async fn pull_for_track(&self, key: TrackKey, metadata: &TrackMetadata) -> Result<usize> {
        let outcome = self.inner.pull(key, metadata, RefreshMode::Batched).await?;
        Ok(outcome.added)
    }

    /// Run one backfill sweep over the recent-tracks stream.
    pub async fn pull_recent_backfill(&self, direction: RecentDirection) -> Result<SweepOutcome> {
        self.inner.sweep(direction).await
    }

    /// Queue a sweep in the background, skipped if another one is running.
    pub fn schedule_backfill(&self, direction: RecentDirection) {
        self.inner.spawn_sweeps(vec![direction]);
    }

    /// Force-fetch the remote history of the selected tracks.
    ///
    /// Rejects an empty selection or one larger than the configured maximum.
    /// Fails only if every item failed; listeners get a single refresh.
    #[instrument(skip(self, tracks), fields(selected = tracks.len()))]
    pub async fn fetch_selected(&self, tracks: &[TrackRef]) -> Result<BatchReport> {
        self.inner.fetch_selected(tracks).await
    }

    /// Drop the remote history of the selected tracks.
    ///
    /// Returns how many records had remote plays to drop.
    #[instrument(skip(self, keys), fields(selected = keys.len()))]
    pub async fn clear_remote_history(&self, keys: &[TrackKey]) -> Result<usize> {
        let inner = &self.inner;
        if keys.is_empty() {
            return Err(SyncError::InvalidSelection {
                reason: "No tracks selected".to_string(),
            });
        }

        let mut seen = HashSet::new();
        let unique: Vec<TrackKey> = keys.iter().copied().filter(|key| seen.insert(*key)).collect();

        let mut cleared = 0;
        let mut failures = Vec::new();
        for key in &unique {
            match inner.records.clear_remote(*key).await {
                Ok(true) => cleared += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(track_key = %key, error = %e, "Failed to clear remote history");
                    failures.push(e.to_string());
                }
            }
        }

        inner.refresh_now(unique.clone());
        info!(cleared, failed = failures.len(), "Cleared remote history");

        if !failures.is_empty() {
            return Err(SyncError::BatchFailed {
                failed: failures.len(),
                total: unique.len(),
                message: failures.join("; "),
            });
        }
        Ok(cleared)
    }

    /// Record a local play of `track` at the current time.
    ///
    /// Returns the track's key, or `None` when no key can be derived.
    #[instrument(skip(self), fields(location = %track.location))]
    pub async fn on_item_played(&self, track: &TrackRef) -> Result<Option<TrackKey>> {
        let inner = &self.inner;
        let patterns = inner.config.read().patterns.clone();
        let metadata = inner.reader.read(track, &patterns).await?;
        let Some(key) = inner.identity.compute_key(&metadata, track, KeyScheme::Current) else {
            debug!("No track key, play not recorded");
            return Ok(None);
        };

        let now = inner.clock.unix_timestamp();
        let (first, last) = (metadata.first_played, metadata.last_played);
        inner
            .records
            .update(key, |record| {
                record.bootstrap_local(first, last);
                if record.last_local() != Some(now) {
                    record.push_local(now);
                }
                true
            })
            .await?;

        if let Some(artist_key) = inner.identity.compute_key(&metadata, track, KeyScheme::Artist) {
            inner.artists.touch(artist_key, now).await?;
        }

        inner.refresh_now(vec![key]);
        debug!(track_key = %key, timestamp = now, "Local play recorded");
        Ok(Some(key))
    }

    /// A new track started playing.
    ///
    /// Fetches its history right away unless the first fetch is delayed,
    /// and starts the periodic sweeps once enough tracks have played.
    pub fn on_playback_new_track(&self, track: TrackRef) {
        let inner = &self.inner;
        if inner.quitting.is_cancelled() {
            return;
        }

        let config = inner.config_snapshot();
        let remote = config.is_remote_configured();
        let sweep_idle = !self.is_sweep_running();

        let (fetch_now, sweeps) = {
            let mut playback = inner.playback.lock();
            playback.current = Some(track.clone());
            playback.first_fetch_done = false;
            playback.since_backward = playback.since_backward.saturating_add(1);
            playback.since_forward = playback.since_forward.saturating_add(1);

            let mut sweeps = Vec::new();
            if remote && config.auto_backfill && sweep_idle {
                if playback.since_backward >= inner.tuning.backward_sweep_every {
                    playback.since_backward = 0;
                    sweeps.push(RecentDirection::Backward);
                }
                if playback.since_forward >= inner.tuning.forward_sweep_every {
                    playback.since_forward = 0;
                    sweeps.push(RecentDirection::Forward);
                }
            }

            let fetch_now = remote && !config.delay_first_fetch;
            if fetch_now {
                playback.first_fetch_done = true;
            }
            (fetch_now, sweeps)
        };

        if fetch_now {
            inner.spawn_playback_fetch(track);
        }
        if !sweeps.is_empty() {
            inner.spawn_sweeps(sweeps);
        }
    }

    /// Playback position update of the current track, in seconds.
    pub fn on_playback_time(&self, position_secs: f64) {
        let inner = &self.inner;
        if inner.quitting.is_cancelled() {
            return;
        }

        let config = inner.config_snapshot();
        if !config.is_remote_configured() || !config.delay_first_fetch {
            return;
        }

        let track = {
            let mut playback = inner.playback.lock();
            if playback.first_fetch_done
                || position_secs < inner.tuning.first_fetch_position.as_secs_f64()
            {
                return;
            }
            let Some(track) = playback.current.clone() else {
                return;
            };
            playback.first_fetch_done = true;
            track
        };
        inner.spawn_playback_fetch(track);
    }

    /// Move a record to the track's new key after a tag edit.
    ///
    /// The move is skipped when the destination already holds more plays.
    /// Returns the destination key if the record moved.
    #[instrument(skip_all, fields(location = %track.location))]
    pub async fn on_metadata_edited(
        &self,
        track: &TrackRef,
        before: &TrackMetadata,
        after: &TrackMetadata,
    ) -> Result<Option<TrackKey>> {
        let inner = &self.inner;
        let old_key = inner.identity.compute_key(before, track, KeyScheme::Current);
        let new_key = inner.identity.compute_key(after, track, KeyScheme::Current);
        let (Some(old_key), Some(new_key)) = (old_key, new_key) else {
            return Ok(None);
        };
        if old_key == new_key {
            return Ok(None);
        }

        let old_record = inner.records.get(old_key).await;
        let new_record = inner.records.get(new_key).await;
        let dest = (!new_record.is_empty()).then_some(&new_record);

        let moved =
            apply_action(&inner.records, plan_transfer(old_key, new_key, &old_record, dest)).await?;
        if let Some(key) = moved {
            inner.refresh_now(vec![key]);
        }
        Ok(moved)
    }

    /// Move every record of the legacy key space to its current key.
    pub async fn migrate_legacy(&self) -> Result<MigrationReport> {
        let inner = &self.inner;
        let patterns = inner.config.read().patterns.clone();
        let report = migrate_legacy_records(
            &inner.records,
            inner.identity.as_ref(),
            inner.reader.as_ref(),
            inner.library.as_ref(),
            &patterns,
        )
        .await?;
        inner.refresh_now(report.transferred.clone());
        Ok(report)
    }

    /// Wait for every queued task without stopping the engine.
    pub async fn wait_idle(&self) {
        self.inner.pool.wait_idle().await;
    }

    /// Stop scheduling work, wait for running tasks and flush refreshes.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        info!("Shutting down reconciliation engine");
        inner.quitting.cancel();
        inner.pool.close().await;
        let keys = inner.pending.take_all();
        inner.refresh_now(keys);
    }
}

impl EngineInner {
    fn config_snapshot(&self) -> PlaycountConfig {
        self.config.read().clone()
    }

    fn is_eligible(&self, metadata: &TrackMetadata) -> bool {
        !metadata.artist.is_empty()
            && !metadata.title.is_empty()
            && metadata.length_secs >= self.tuning.min_track_length_secs
    }

    async fn pull(
        &self,
        key: TrackKey,
        metadata: &TrackMetadata,
        refresh: RefreshMode,
    ) -> Result<PullOutcome> {
        let skipped = PullOutcome {
            added: 0,
            last_remote: None,
        };
        if self.quitting.is_cancelled() {
            return Ok(skipped);
        }

        let config = self.config_snapshot();
        if !config.is_remote_configured() || !self.is_eligible(metadata) {
            return Ok(skipped);
        }

        let offset = config.remote_time_offset_secs;
        let since = self.records.get(key).await.last_remote().map(|t| t - offset);
        let policy = MatchPolicy {
            compare_album: config.compare_album,
            dedup_window_secs: config
                .dedup_remote_scrobbles
                .then_some(config.min_separation_secs),
        };
        let query = TrackQuery::new(key, &metadata.artist, &metadata.album, &metadata.title)
            .since(since);

        let times = match self.client.query_by_track(&query, &policy).await {
            Ok(times) => times,
            Err(MetadataError::NotConfigured(reason)) => {
                debug!(track_key = %key, %reason, "Remote lookup not configured");
                return Ok(skipped);
            }
            Err(e) => return Err(e.into()),
        };
        let shifted: Vec<i64> = times.iter().map(|t| t + offset).collect();

        let (first, last) = (metadata.first_played, metadata.last_played);
        let mut added = 0;
        let record = self
            .records
            .update(key, |record| {
                let had_local = !record.local_play_times.is_empty();
                record.bootstrap_local(first, last);
                added = record.merge_remote(&shifted);
                added > 0 || (!had_local && !record.local_play_times.is_empty())
            })
            .await?;

        debug!(track_key = %key, added, "Remote history merged");

        match refresh {
            RefreshMode::Immediate if added > 0 => self.refresh_now(vec![key]),
            RefreshMode::Immediate | RefreshMode::Batched => {
                if let Some(batch) = self.pending.insert(key) {
                    self.refresh_now(batch);
                }
            }
            RefreshMode::Deferred => {}
        }

        Ok(PullOutcome {
            added,
            last_remote: record.last_remote().map(|t| t - offset),
        })
    }

    /// Hand a refresh of `keys` to the main thread.
    fn refresh_now(&self, keys: Vec<TrackKey>) {
        if keys.is_empty() {
            return;
        }
        let blobs = Arc::clone(&self.blobs);
        debug!(count = keys.len(), "Dispatching refresh");
        self.dispatcher.run_on_main(Box::pin(async move {
            blobs.dispatch_refresh(CollectionId::PlayHistory, &keys);
        }));
    }

    /// Write the watermarks into the shared config and persist them, on
    /// the main thread.
    fn persist_watermarks(&self, marks: Watermarks) {
        let config = Arc::clone(&self.config);
        let store = Arc::clone(&self.config_store);
        self.dispatcher.run_on_main(Box::pin(async move {
            {
                let mut config = config.write();
                config.latest_checked = marks.latest;
                config.earliest_checked = marks.earliest;
            }
            if let Err(e) = store.save_watermarks(marks.latest, marks.earliest).await {
                warn!(error = %e, "Failed to persist sweep watermarks");
            }
        }));
    }

    fn spawn_playback_fetch(self: &Arc<Self>, track: TrackRef) {
        let engine = Arc::clone(self);
        let spawned = self.pool.spawn(async move {
            let patterns = engine.config.read().patterns.clone();
            let metadata = match engine.reader.read(&track, &patterns).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!(location = %track.location, error = %e, "Cannot read playing track");
                    return;
                }
            };
            let Some(key) = engine.identity.compute_key(&metadata, &track, KeyScheme::Current)
            else {
                return;
            };
            if let Err(e) = engine.pull(key, &metadata, RefreshMode::Immediate).await {
                warn!(track_key = %key, error = %e, "Playback fetch failed");
            }
        });
        if let Err(e) = spawned {
            debug!(error = %e, "Playback fetch not scheduled");
        }
    }

    fn spawn_sweeps(self: &Arc<Self>, directions: Vec<RecentDirection>) {
        let engine = Arc::clone(self);
        let spawned = self.pool.spawn_control(async move {
            for direction in directions {
                match engine.sweep(direction).await {
                    Ok(outcome) => debug!(?direction, ?outcome, "Periodic sweep finished"),
                    Err(e) => warn!(?direction, error = %e, "Periodic sweep failed"),
                }
            }
        });
        if let Err(e) = spawned {
            debug!(error = %e, "Periodic sweep not scheduled");
        }
    }

    #[instrument(skip(self))]
    async fn sweep(self: &Arc<Self>, direction: RecentDirection) -> Result<SweepOutcome> {
        let Ok(_sweep) = self.sweep_lock.try_lock() else {
            info!("Backfill sweep already running");
            return Ok(SweepOutcome::AlreadyRunning);
        };
        let _active = ActiveFlag::raise(&self.sweep_active);
        if self.quitting.is_cancelled() {
            return Ok(SweepOutcome::Cancelled);
        }

        let config = self.config_snapshot();
        if !config.is_remote_configured() {
            return Ok(SweepOutcome::NotConfigured);
        }

        let watermark = {
            let marks = self.watermarks.lock();
            match direction {
                RecentDirection::Forward => marks.latest,
                RecentDirection::Backward => marks.earliest,
            }
        };
        let candidates = match self.client.query_recent_tracks(direction, watermark).await {
            Ok(candidates) => candidates,
            Err(MetadataError::NotConfigured(_)) => return Ok(SweepOutcome::NotConfigured),
            Err(e) => return Err(e.into()),
        };

        let mut report = SweepReport {
            candidates: candidates.len(),
            ..SweepReport::default()
        };
        let before = *self.watermarks.lock();

        let queued = self.resolve_candidates(&candidates, &config, &mut report).await;
        if self.quitting.is_cancelled() {
            return Ok(SweepOutcome::Cancelled);
        }

        let mut limiter = RateLimiter::steady(self.tuning.sweep_delay);
        let mut handles = Vec::with_capacity(queued.len());
        for (key, metadata) in queued {
            if self.quitting.is_cancelled() {
                break;
            }
            limiter.pace().await;
            let engine = Arc::clone(self);
            match self.pool.spawn(async move {
                let outcome = engine.pull(key, &metadata, RefreshMode::Batched).await?;
                if let Some(last) = outcome.last_remote {
                    engine.watermarks.lock().observe(last, false);
                }
                Ok::<usize, SyncError>(outcome.added)
            }) {
                Ok(handle) => handles.push(handle),
                Err(_) => break,
            }
        }

        for joined in join_all(handles).await {
            match joined {
                Ok(Ok(added)) => {
                    report.fetched += 1;
                    report.new_scrobbles += added;
                }
                Ok(Err(e)) => {
                    debug!(error = %e, "Sweep fetch failed");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Sweep fetch task aborted");
                    report.failed += 1;
                }
            }
        }

        let keys = self.pending.take_all();
        self.refresh_now(keys);

        let after = *self.watermarks.lock();
        if after != before {
            self.persist_watermarks(after);
        }

        info!(
            candidates = report.candidates,
            resolved = report.resolved,
            fetched = report.fetched,
            new_scrobbles = report.new_scrobbles,
            failed = report.failed,
            "Backfill sweep finished"
        );
        Ok(SweepOutcome::Completed(report))
    }

    /// Map candidates to library tracks and decide which need a fetch.
    ///
    /// Tracks already covered up to a candidate advance the watermarks
    /// instead.
    async fn resolve_candidates(
        &self,
        candidates: &[ScrobbleCandidate],
        config: &PlaycountConfig,
        report: &mut SweepReport,
    ) -> Vec<(TrackKey, TrackMetadata)> {
        let offset = config.remote_time_offset_secs;
        let mut seen: HashSet<TrackKey> = HashSet::new();
        let mut queued = Vec::new();

        for candidate in candidates {
            if self.quitting.is_cancelled() {
                break;
            }

            let query = LibraryQuery {
                artist: if candidate.artist_needs_escaping {
                    ArtistMatch::Escaped(candidate.artist.clone())
                } else {
                    ArtistMatch::Exact(candidate.artist.clone())
                },
                title: candidate.title.clone(),
                album: (config.compare_album && !candidate.album.is_empty())
                    .then(|| candidate.album.clone()),
            };
            let tracks = match self.library.search(&query).await {
                Ok(tracks) => tracks,
                Err(e) => {
                    debug!(artist = %candidate.artist, title = %candidate.title, error = %e, "Library search failed");
                    continue;
                }
            };

            for track in tracks {
                let Ok(metadata) = self.reader.read(&track, &config.patterns).await else {
                    continue;
                };
                let Some(key) = self.identity.compute_key(&metadata, &track, KeyScheme::Current)
                else {
                    continue;
                };
                if !seen.insert(key) {
                    continue;
                }
                report.resolved += 1;

                let record: PlayRecord = self.records.get(key).await;
                match record.last_remote().map(|t| t - offset) {
                    Some(last) if candidate.timestamp <= last + self.tuning.sweep_grace_secs => {
                        self.watermarks.lock().observe(candidate.timestamp, true);
                    }
                    _ if queued.len() < self.tuning.max_sweep_fetches => {
                        queued.push((key, metadata));
                    }
                    _ => report.deferred += 1,
                }
            }
        }
        queued
    }

    async fn fetch_selected(self: &Arc<Self>, tracks: &[TrackRef]) -> Result<BatchReport> {
        if tracks.is_empty() {
            return Err(SyncError::InvalidSelection {
                reason: "No tracks selected".to_string(),
            });
        }
        let max = self.tuning.max_manual_selection;
        if tracks.len() > max {
            return Err(SyncError::InvalidSelection {
                reason: format!(
                    "At most {} tracks can be fetched at once, {} selected",
                    max,
                    tracks.len()
                ),
            });
        }

        let mut report = BatchReport {
            requested: tracks.len(),
            ..BatchReport::default()
        };
        let patterns = self.config.read().patterns.clone();
        let mut seen = HashSet::new();
        let mut resolved = Vec::new();
        for track in tracks {
            let metadata = match self.reader.read(track, &patterns).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    report.failures.push(format!("{}: {}", track.location, e));
                    continue;
                }
            };
            match self.identity.compute_key(&metadata, track, KeyScheme::Current) {
                Some(key) => {
                    if seen.insert(key) {
                        resolved.push((key, metadata));
                    }
                }
                None => report
                    .failures
                    .push(format!("{}: no track key for this item", track.location)),
            }
        }
        report.resolved = resolved.len();

        let keys: Vec<TrackKey> = resolved.iter().map(|(key, _)| *key).collect();
        let mut limiter = RateLimiter::new(self.tuning.manual_burst, self.tuning.manual_delay);
        let mut handles = Vec::with_capacity(resolved.len());
        for (key, metadata) in resolved {
            if self.quitting.is_cancelled() {
                break;
            }
            limiter.pace().await;
            let engine = Arc::clone(self);
            let handle = self.pool.spawn(async move {
                engine
                    .pull(key, &metadata, RefreshMode::Deferred)
                    .await
                    .map(|outcome| outcome.added)
                    .map_err(|e| format!("{}: {}", key, e))
            })?;
            handles.push(handle);
        }

        let mut fetched = 0;
        for joined in join_all(handles).await {
            match joined {
                Ok(Ok(added)) => {
                    fetched += 1;
                    report.new_scrobbles += added;
                }
                Ok(Err(message)) => report.failures.push(message),
                Err(e) => report.failures.push(format!("Task failed: {}", e)),
            }
        }

        self.refresh_now(keys);

        let total = report.requested;
        if fetched == 0 && !self.quitting.is_cancelled() {
            return Err(SyncError::BatchFailed {
                failed: report.failures.len(),
                total,
                message: report.failures.join("; "),
            });
        }
        info!(
            resolved = report.resolved,
            new_scrobbles = report.new_scrobbles,
            failed = report.failures.len(),
            fetched,
            "Manual fetch finished"
        );
        Ok(report)
    }
}

/// Holds an [`AtomicBool`] high until dropped.
struct ActiveFlag<'a>(&'a AtomicBool);

impl<'a> ActiveFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for ActiveFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
