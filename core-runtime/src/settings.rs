//! # Play-History Preferences
//!
//! [`PlaycountConfig`] holds every persisted option the reconciliation core
//! reads: feature toggles, the remote account, the response cache size, the
//! three field patterns and the two sweep watermarks.
//!
//! It is shared as a [`SharedConfig`] (`Arc<RwLock<_>>`). Workers only take
//! snapshots; writes happen on the main thread through [`ConfigStore`].

use crate::error::{Error, Result};
use bridge_traits::{FieldPatterns, SettingsStore};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Largest accepted response cache size.
pub const MAX_CACHE_SIZE: usize = 50;
/// Response cache size used when nothing was persisted.
pub const DEFAULT_CACHE_SIZE: usize = 40;
/// Username value written by older releases to mean "not configured".
const UNSET_USERNAME: &str = "<none>";
/// Schema version of the persisted keys.
const SETTINGS_VERSION: i64 = 3;
const KEY_PREFIX: &str = "playcount.";

/// Shared, read-mostly handle to the preferences.
pub type SharedConfig = Arc<RwLock<PlaycountConfig>>;

/// Persisted options of the play-history core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaycountConfig {
    /// Query the remote service at all.
    pub enable_remote_lookup: bool,
    /// Require the album to match in addition to the title.
    pub compare_album: bool,
    /// Collapse remote scrobbles closer than `min_separation_secs`.
    pub dedup_remote_scrobbles: bool,
    /// Count a local play that the remote service has not seen yet.
    pub increment_with_local_play: bool,
    /// Run backfill sweeps automatically during playback.
    pub auto_backfill: bool,
    /// Wait until playback has progressed before the first fetch of a track.
    pub delay_first_fetch: bool,
    pub remote_username: Option<String>,
    pub api_key: Option<String>,
    /// Response cache capacity, `0..=50`. Zero disables caching.
    pub cache_size: usize,
    pub patterns: FieldPatterns,
    /// Newest remote timestamp confirmed across all tracks.
    pub latest_checked: Option<i64>,
    /// Oldest remote timestamp confirmed by backfill sweeps.
    pub earliest_checked: Option<i64>,
    /// Shift applied to remote timestamps before they are stored.
    pub remote_time_offset_secs: i64,
    /// Minimum distance between two kept remote scrobbles.
    pub min_separation_secs: i64,
    /// Set once the legacy key space has been migrated.
    pub legacy_migrated: bool,
}

impl Default for PlaycountConfig {
    fn default() -> Self {
        Self {
            enable_remote_lookup: false,
            compare_album: true,
            dedup_remote_scrobbles: true,
            increment_with_local_play: true,
            auto_backfill: true,
            delay_first_fetch: true,
            remote_username: None,
            api_key: None,
            cache_size: DEFAULT_CACHE_SIZE,
            patterns: FieldPatterns::default(),
            latest_checked: None,
            earliest_checked: None,
            remote_time_offset_secs: 0,
            min_separation_secs: 29,
            legacy_migrated: false,
        }
    }
}

impl PlaycountConfig {
    /// Creates a new builder starting from the defaults.
    pub fn builder() -> PlaycountConfigBuilder {
        PlaycountConfigBuilder::default()
    }

    /// True when remote lookup is enabled and both account fields are set.
    pub fn is_remote_configured(&self) -> bool {
        self.enable_remote_lookup && self.remote_username.is_some() && self.api_key.is_some()
    }

    /// Wrap into a [`SharedConfig`].
    pub fn into_shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.cache_size > MAX_CACHE_SIZE {
            return Err(Error::Config(format!(
                "Cache size {} exceeds maximum of {}",
                self.cache_size, MAX_CACHE_SIZE
            )));
        }

        if self.min_separation_secs < 0 {
            return Err(Error::Config(
                "Minimum scrobble separation cannot be negative".to_string(),
            ));
        }

        if let (Some(latest), Some(earliest)) = (self.latest_checked, self.earliest_checked) {
            if earliest > latest {
                return Err(Error::Config(format!(
                    "Earliest watermark {} is newer than latest watermark {}",
                    earliest, latest
                )));
            }
        }

        Ok(())
    }
}

fn normalize_username(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != UNSET_USERNAME)
}

fn normalize_pattern(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Builder for [`PlaycountConfig`].
#[derive(Debug, Default)]
pub struct PlaycountConfigBuilder {
    config: PlaycountConfig,
}

impl PlaycountConfigBuilder {
    pub fn enable_remote_lookup(mut self, enabled: bool) -> Self {
        self.config.enable_remote_lookup = enabled;
        self
    }

    pub fn compare_album(mut self, enabled: bool) -> Self {
        self.config.compare_album = enabled;
        self
    }

    pub fn dedup_remote_scrobbles(mut self, enabled: bool) -> Self {
        self.config.dedup_remote_scrobbles = enabled;
        self
    }

    pub fn increment_with_local_play(mut self, enabled: bool) -> Self {
        self.config.increment_with_local_play = enabled;
        self
    }

    pub fn auto_backfill(mut self, enabled: bool) -> Self {
        self.config.auto_backfill = enabled;
        self
    }

    pub fn delay_first_fetch(mut self, enabled: bool) -> Self {
        self.config.delay_first_fetch = enabled;
        self
    }

    /// Sets the remote account. The legacy `<none>` placeholder clears it.
    pub fn remote_username(mut self, username: impl Into<String>) -> Self {
        self.config.remote_username = normalize_username(Some(username.into()));
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.api_key = if key.trim().is_empty() { None } else { Some(key) };
        self
    }

    /// Sets the response cache size, clamped to `0..=50`.
    pub fn cache_size(mut self, size: usize) -> Self {
        self.config.cache_size = size.min(MAX_CACHE_SIZE);
        self
    }

    pub fn patterns(mut self, patterns: FieldPatterns) -> Self {
        self.config.patterns = patterns;
        self
    }

    pub fn watermarks(mut self, latest: Option<i64>, earliest: Option<i64>) -> Self {
        self.config.latest_checked = latest;
        self.config.earliest_checked = earliest;
        self
    }

    pub fn remote_time_offset_secs(mut self, offset: i64) -> Self {
        self.config.remote_time_offset_secs = offset;
        self
    }

    pub fn min_separation_secs(mut self, secs: i64) -> Self {
        self.config.min_separation_secs = secs;
        self
    }

    pub fn build(self) -> Result<PlaycountConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Loads and saves [`PlaycountConfig`] through a [`SettingsStore`].
///
/// Keys live under the `playcount.` prefix. Missing keys take their default
/// values so a fresh install needs no setup.
pub struct ConfigStore {
    store: Arc<dyn SettingsStore>,
}

impl ConfigStore {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    fn key(name: &str) -> String {
        format!("{}{}", KEY_PREFIX, name)
    }

    async fn bool_or(&self, name: &str, default: bool) -> Result<bool> {
        Ok(self.store.get_bool(&Self::key(name)).await?.unwrap_or(default))
    }

    async fn string(&self, name: &str) -> Result<Option<String>> {
        Ok(self.store.get_string(&Self::key(name)).await?)
    }

    async fn i64(&self, name: &str) -> Result<Option<i64>> {
        Ok(self.store.get_i64(&Self::key(name)).await?)
    }

    /// Read the persisted configuration.
    pub async fn load(&self) -> Result<PlaycountConfig> {
        let defaults = PlaycountConfig::default();
        let stored_version = self.i64("version").await?.unwrap_or(0);

        let mut config = PlaycountConfig {
            enable_remote_lookup: self
                .bool_or("enable_remote_lookup", defaults.enable_remote_lookup)
                .await?,
            compare_album: self.bool_or("compare_album", defaults.compare_album).await?,
            dedup_remote_scrobbles: self
                .bool_or("dedup_remote_scrobbles", defaults.dedup_remote_scrobbles)
                .await?,
            increment_with_local_play: self
                .bool_or("increment_with_local_play", defaults.increment_with_local_play)
                .await?,
            auto_backfill: self.bool_or("auto_backfill", defaults.auto_backfill).await?,
            delay_first_fetch: self
                .bool_or("delay_first_fetch", defaults.delay_first_fetch)
                .await?,
            remote_username: normalize_username(self.string("remote_username").await?),
            api_key: self.string("api_key").await?.filter(|k| !k.trim().is_empty()),
            cache_size: self
                .i64("cache_size")
                .await?
                .map(|size| size.clamp(0, MAX_CACHE_SIZE as i64) as usize)
                .unwrap_or(defaults.cache_size),
            patterns: FieldPatterns {
                artist: normalize_pattern(
                    self.string("artist_pattern").await?,
                    &defaults.patterns.artist,
                ),
                album: normalize_pattern(
                    self.string("album_pattern").await?,
                    &defaults.patterns.album,
                ),
                title: normalize_pattern(
                    self.string("title_pattern").await?,
                    &defaults.patterns.title,
                ),
            },
            latest_checked: self.i64("latest_checked").await?.filter(|ts| *ts > 0),
            earliest_checked: self.i64("earliest_checked").await?.filter(|ts| *ts > 0),
            remote_time_offset_secs: self
                .i64("remote_time_offset_secs")
                .await?
                .unwrap_or(defaults.remote_time_offset_secs),
            min_separation_secs: self
                .i64("min_separation_secs")
                .await?
                .filter(|secs| *secs >= 0)
                .unwrap_or(defaults.min_separation_secs),
            legacy_migrated: self.bool_or("legacy_migrated", false).await?,
        };

        if stored_version < SETTINGS_VERSION {
            debug!(
                stored_version,
                current_version = SETTINGS_VERSION,
                "Resetting sweep watermarks after settings upgrade"
            );
            config.latest_checked = None;
            config.earliest_checked = None;
        }

        Ok(config)
    }

    /// Persist every field of `config`.
    pub async fn save(&self, config: &PlaycountConfig) -> Result<()> {
        let s = &self.store;
        s.set_i64(&Self::key("version"), SETTINGS_VERSION).await?;
        s.set_bool(&Self::key("enable_remote_lookup"), config.enable_remote_lookup)
            .await?;
        s.set_bool(&Self::key("compare_album"), config.compare_album)
            .await?;
        s.set_bool(
            &Self::key("dedup_remote_scrobbles"),
            config.dedup_remote_scrobbles,
        )
        .await?;
        s.set_bool(
            &Self::key("increment_with_local_play"),
            config.increment_with_local_play,
        )
        .await?;
        s.set_bool(&Self::key("auto_backfill"), config.auto_backfill)
            .await?;
        s.set_bool(&Self::key("delay_first_fetch"), config.delay_first_fetch)
            .await?;
        s.set_string(
            &Self::key("remote_username"),
            config.remote_username.as_deref().unwrap_or(UNSET_USERNAME),
        )
        .await?;
        match &config.api_key {
            Some(key) => s.set_string(&Self::key("api_key"), key).await?,
            None => s.delete(&Self::key("api_key")).await?,
        }
        s.set_i64(&Self::key("cache_size"), config.cache_size as i64)
            .await?;
        s.set_string(&Self::key("artist_pattern"), &config.patterns.artist)
            .await?;
        s.set_string(&Self::key("album_pattern"), &config.patterns.album)
            .await?;
        s.set_string(&Self::key("title_pattern"), &config.patterns.title)
            .await?;
        self.save_watermarks(config.latest_checked, config.earliest_checked)
            .await?;
        s.set_i64(
            &Self::key("remote_time_offset_secs"),
            config.remote_time_offset_secs,
        )
        .await?;
        s.set_i64(&Self::key("min_separation_secs"), config.min_separation_secs)
            .await?;
        s.set_bool(&Self::key("legacy_migrated"), config.legacy_migrated)
            .await?;
        Ok(())
    }

    /// Persist only the two sweep watermarks.
    pub async fn save_watermarks(&self, latest: Option<i64>, earliest: Option<i64>) -> Result<()> {
        self.store
            .set_i64(&Self::key("version"), SETTINGS_VERSION)
            .await?;
        self.store
            .set_i64(&Self::key("latest_checked"), latest.unwrap_or(0))
            .await?;
        self.store
            .set_i64(&Self::key("earliest_checked"), earliest.unwrap_or(0))
            .await?;
        Ok(())
    }

    /// Record that the legacy key space has been migrated.
    pub async fn mark_legacy_migrated(&self) -> Result<()> {
        self.store
            .set_bool(&Self::key("legacy_migrated"), true)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySettings {
        values: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl SettingsStore for MemorySettings {
        async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn set_bool(&self, key: &str, value: bool) -> BridgeResult<()> {
            self.set_string(key, &value.to_string()).await
        }

        async fn get_bool(&self, key: &str) -> BridgeResult<Option<bool>> {
            Ok(self.get_string(key).await?.and_then(|v| v.parse().ok()))
        }

        async fn set_i64(&self, key: &str, value: i64) -> BridgeResult<()> {
            self.set_string(key, &value.to_string()).await
        }

        async fn get_i64(&self, key: &str) -> BridgeResult<Option<i64>> {
            Ok(self.get_string(key).await?.and_then(|v| v.parse().ok()))
        }

        async fn delete(&self, key: &str) -> BridgeResult<()> {
            self.values.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[test]
    fn test_defaults() {
        let config = PlaycountConfig::default();
        assert!(!config.enable_remote_lookup);
        assert!(config.compare_album);
        assert!(config.dedup_remote_scrobbles);
        assert!(config.increment_with_local_play);
        assert!(config.auto_backfill);
        assert!(config.delay_first_fetch);
        assert_eq!(config.cache_size, 40);
        assert_eq!(config.min_separation_secs, 29);
        assert!(!config.is_remote_configured());
    }

    #[test]
    fn test_builder_clamps_cache_size() {
        let config = PlaycountConfig::builder().cache_size(500).build().unwrap();
        assert_eq!(config.cache_size, MAX_CACHE_SIZE);
    }

    #[test]
    fn test_placeholder_username_is_unset() {
        let config = PlaycountConfig::builder()
            .enable_remote_lookup(true)
            .remote_username("<none>")
            .api_key("key")
            .build()
            .unwrap();
        assert_eq!(config.remote_username, None);
        assert!(!config.is_remote_configured());
    }

    #[test]
    fn test_remote_configured_requires_all_fields() {
        let config = PlaycountConfig::builder()
            .enable_remote_lookup(true)
            .remote_username("listener")
            .api_key("key")
            .build()
            .unwrap();
        assert!(config.is_remote_configured());
    }

    #[test]
    fn test_validate_rejects_inverted_watermarks() {
        let result = PlaycountConfig::builder()
            .watermarks(Some(100), Some(200))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_load_without_saved_values_uses_defaults() {
        let store = ConfigStore::new(Arc::new(MemorySettings::default()));
        let config = store.load().await.unwrap();
        assert_eq!(config, PlaycountConfig::default());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = ConfigStore::new(Arc::new(MemorySettings::default()));
        let config = PlaycountConfig::builder()
            .enable_remote_lookup(true)
            .remote_username("listener")
            .api_key("key")
            .cache_size(12)
            .compare_album(false)
            .watermarks(Some(2_000), Some(1_000))
            .build()
            .unwrap();

        store.save(&config).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_old_settings_version_resets_watermarks() {
        let settings = Arc::new(MemorySettings::default());
        settings.set_i64("playcount.version", 2).await.unwrap();
        settings
            .set_i64("playcount.latest_checked", 5_000)
            .await
            .unwrap();
        settings
            .set_i64("playcount.earliest_checked", 4_000)
            .await
            .unwrap();

        let config = ConfigStore::new(settings).load().await.unwrap();
        assert_eq!(config.latest_checked, None);
        assert_eq!(config.earliest_checked, None);
    }

    #[tokio::test]
    async fn test_load_clamps_persisted_cache_size() {
        let settings = Arc::new(MemorySettings::default());
        settings.set_i64("playcount.cache_size", 90).await.unwrap();
        let config = ConfigStore::new(settings).load().await.unwrap();
        assert_eq!(config.cache_size, MAX_CACHE_SIZE);
    }
}
