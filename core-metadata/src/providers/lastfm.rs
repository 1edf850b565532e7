//! Last.fm API Client
//!
//! Reads a user's scrobble history from the Last.fm API.
//!
//! ## API Endpoints
//!
//! - **Track scrobbles**: `user.getTrackScrobbles` - every scrobble of one
//!   artist/track pair, newest first, 200 per page
//! - **Recent tracks**: `user.getRecentTracks` - the global scrobble stream,
//!   newest first, 100 per page, bounded by `from` or `to`
//!
//! ## Caching
//!
//! Responses pass through a [`ResponseCache`] keyed by the query
//! fingerprint. Transport failures are answered with an empty JSON object
//! that is never cached, so callers simply see an empty result.
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::providers::lastfm::{LastFmClient, TrackQuery};
//!
//! let client = LastFmClient::new(http_client, shared_config, "playcount/0.1");
//! let times = client
//!     .query_by_track(&TrackQuery::new(key, "Artist", "Album", "Title"), &policy)
//!     .await?;
//! ```

use crate::cache::{CacheLookup, ResponseCache};
use crate::error::{MetadataError, Result};
use crate::matching::{escape_quotes, MatchPolicy, QUOTE_ESCAPE};
use crate::query::Query;
use bridge_traits::http::{HttpClient, HttpRequest};
use bridge_traits::TrackKey;
use bytes::Bytes;
use core_runtime::logging::redact_query_secrets;
use core_runtime::SharedConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Timeout for API requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Entries per `user.getTrackScrobbles` page.
pub const TRACK_PAGE_LIMIT: usize = 200;
/// Entries per `user.getRecentTracks` page.
pub const RECENT_PAGE_LIMIT: usize = 100;
/// Page cap for recent-track scans.
pub const RECENT_MAX_PAGES: u32 = 5;
/// Lower bound of the per-track page cap.
const MIN_TRACK_PAGES: u32 = 5;

/// Body substituted for failed requests.
const EMPTY_BODY: &[u8] = b"{}";

/// Which end of the scrobble stream a recent-tracks scan reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecentDirection {
    /// Newer than the latest watermark (live tail).
    Forward,
    /// Older than the earliest watermark (history).
    Backward,
}

/// One entry of the recent-tracks stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrobbleCandidate {
    /// Artist with embedded quotes escaped.
    pub artist: String,
    pub title: String,
    pub album: String,
    pub timestamp: i64,
    /// The artist contained quotes, so library searches need the escaped form.
    pub artist_needs_escaping: bool,
}

/// Parameters of a per-track history lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackQuery {
    /// Cache consumer; a key never reads the same cached page twice.
    pub consumer: TrackKey,
    pub artist: String,
    pub album: String,
    pub title: String,
    /// Last remote timestamp already known for the track, in remote time.
    pub since: Option<i64>,
}

impl TrackQuery {
    pub fn new(
        consumer: TrackKey,
        artist: impl Into<String>,
        album: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            consumer,
            artist: artist.into(),
            album: album.into(),
            title: title.into(),
            since: None,
        }
    }

    pub fn since(mut self, since: Option<i64>) -> Self {
        self.since = since;
        self
    }
}

/// Last.fm `#text` wrapper
#[derive(Debug, Clone, Default, Deserialize)]
struct TextField {
    #[serde(rename = "#text", default)]
    text: String,
}

/// Unix time, sent as a string but tolerated as a number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Uts {
    Text(String),
    Number(i64),
}

impl Uts {
    fn seconds(&self) -> Option<i64> {
        match self {
            Uts::Text(text) => text.trim().parse().ok(),
            Uts::Number(n) => Some(*n),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ScrobbleDate {
    uts: Uts,
}

/// Single entries are sometimes sent as a bare object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
struct TrackScrobble {
    #[serde(default)]
    name: String,
    #[serde(default)]
    album: TextField,
    date: Option<ScrobbleDate>,
}

#[derive(Debug, Deserialize)]
struct TrackScrobbles {
    track: Option<OneOrMany<TrackScrobble>>,
}

#[derive(Debug, Deserialize)]
struct TrackScrobblesResponse {
    trackscrobbles: Option<TrackScrobbles>,
    #[serde(flatten)]
    error: ErrorFields,
}

#[derive(Debug, Deserialize)]
struct NowPlayingAttr {
    nowplaying: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecentTrack {
    #[serde(default)]
    name: String,
    #[serde(default)]
    artist: TextField,
    #[serde(default)]
    album: TextField,
    date: Option<ScrobbleDate>,
    #[serde(rename = "@attr")]
    attr: Option<NowPlayingAttr>,
}

#[derive(Debug, Deserialize)]
struct RecentTracks {
    track: Option<OneOrMany<RecentTrack>>,
}

#[derive(Debug, Deserialize)]
struct RecentTracksResponse {
    recenttracks: Option<RecentTracks>,
    #[serde(flatten)]
    error: ErrorFields,
}

/// Last.fm error response
#[derive(Debug, Default, Deserialize)]
struct ErrorFields {
    error: Option<i32>,
    message: Option<String>,
}

impl ErrorFields {
    fn into_error(self, missing: &str) -> MetadataError {
        match self.error {
            Some(code) => MetadataError::RemoteApi {
                code,
                message: self.message.unwrap_or_default(),
            },
            None => MetadataError::JsonParse(format!("Response has no `{}` object", missing)),
        }
    }
}

fn parse_track_page(body: &[u8]) -> Result<Vec<TrackScrobble>> {
    let response: TrackScrobblesResponse = serde_json::from_slice(body)
        .map_err(|e| MetadataError::JsonParse(format!("Failed to parse track scrobbles: {}", e)))?;
    match response.trackscrobbles {
        Some(page) => Ok(page.track.map(OneOrMany::into_vec).unwrap_or_default()),
        None => Err(response.error.into_error("trackscrobbles")),
    }
}

fn parse_recent_page(body: &[u8]) -> Result<Vec<RecentTrack>> {
    let response: RecentTracksResponse = serde_json::from_slice(body)
        .map_err(|e| MetadataError::JsonParse(format!("Failed to parse recent tracks: {}", e)))?;
    match response.recenttracks {
        Some(page) => Ok(page.track.map(OneOrMany::into_vec).unwrap_or_default()),
        None => Err(response.error.into_error("recenttracks")),
    }
}

fn log_page_error(method: &str, page: u32, error: &MetadataError) {
    match error {
        MetadataError::RemoteApi { .. } => {
            warn!(method, page, error = %error, "Last.fm rejected query")
        }
        _ => debug!(method, page, error = %error, "Stopping pagination"),
    }
}

/// Last.fm API client
///
/// Account settings are read from the shared configuration on every call,
/// so preference changes apply without rebuilding the client.
///
/// Paginated scans stop before the next page once the shutdown token is
/// cancelled and return what they collected so far.
pub struct LastFmClient {
    http_client: Arc<dyn HttpClient>,
    config: SharedConfig,
    cache: ResponseCache,
    user_agent: String,
    shutdown: CancellationToken,
}

struct Account {
    username: String,
    api_key: String,
    cache_size: usize,
}

impl LastFmClient {
    /// Creates a client whose cache is sized from `config`.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        config: SharedConfig,
        user_agent: impl Into<String>,
    ) -> Self {
        let cache_size = config.read().cache_size;
        Self {
            http_client,
            config,
            cache: ResponseCache::new(cache_size),
            user_agent: user_agent.into(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that aborts in-flight pagination when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Apply a new response cache size, `0` disables caching.
    pub fn set_cache_size(&self, size: usize) {
        debug!(size, "Resizing response cache");
        self.cache.resize(size);
    }

    fn account(&self) -> Result<Account> {
        let config = self.config.read();
        match (&config.remote_username, &config.api_key) {
            (Some(username), Some(api_key)) => Ok(Account {
                username: username.clone(),
                api_key: api_key.clone(),
                cache_size: config.cache_size,
            }),
            _ => Err(MetadataError::NotConfigured(
                "Last.fm username and API key are required".to_string(),
            )),
        }
    }

    /// Fetch `query`, answering from the cache when `consumer` has not read
    /// the cached body yet.
    async fn fetch(&self, query: &Query, consumer: TrackKey) -> Bytes {
        let fingerprint = query.fingerprint();
        if let CacheLookup::Hit(body) = self.cache.get(fingerprint, consumer) {
            debug!(method = query.method(), fingerprint, "Serving cached response");
            return body;
        }

        let url = query.url();
        debug!(url = %redact_query_secrets(&url), "Querying Last.fm");

        let request = HttpRequest::get(url)
            .header("User-Agent", self.user_agent.as_str())
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT);

        match self.http_client.execute(request).await {
            Ok(response) if response.is_success() => {
                if query.is_cacheable() {
                    self.cache.put(fingerprint, consumer, response.body.clone());
                }
                response.body
            }
            Ok(response) => {
                // Error bodies still carry the API's error code and message.
                warn!(method = query.method(), status = response.status, "Last.fm request failed");
                response.body
            }
            Err(e) => {
                warn!(method = query.method(), error = %e, "Last.fm request failed");
                Bytes::from_static(EMPTY_BODY)
            }
        }
    }

    /// All remote plays of one track newer than `query.since`, oldest first.
    ///
    /// Pages are scanned newest first until an entry at or before the cutoff
    /// is reached, a short page arrives or the page cap is hit. With a dedup
    /// window, the cutoff is pushed forward by the window so an echo of the
    /// last known scrobble is not re-added.
    #[instrument(skip(self, query, policy), fields(track_key = %query.consumer))]
    pub async fn query_by_track(&self, query: &TrackQuery, policy: &MatchPolicy) -> Result<Vec<i64>> {
        let account = self.account()?;
        let max_pages = (account.cache_size as u32).saturating_sub(1).max(MIN_TRACK_PAGES);
        let cutoff = query
            .since
            .map(|since| since.saturating_add(policy.dedup_window_secs.unwrap_or(0)));

        let mut newest_first: Vec<i64> = Vec::new();
        let mut page = 1;
        loop {
            if self.shutdown.is_cancelled() {
                debug!(page, "Shutting down, abandoning track history scan");
                break;
            }
            let request = Query::new("user.getTrackScrobbles")
                .api_key(&account.api_key)
                .param("user", &account.username)
                .param("artist", &query.artist)
                .param("track", &query.title)
                .param("limit", TRACK_PAGE_LIMIT)
                .param("format", "json")
                .param("page", page);

            let body = self.fetch(&request, query.consumer).await;
            let entries = match parse_track_page(&body) {
                Ok(entries) => entries,
                Err(e) => {
                    log_page_error(request.method(), page, &e);
                    break;
                }
            };

            let page_len = entries.len();
            let mut reached_cutoff = false;
            for entry in entries {
                let Some(ts) = entry.date.as_ref().and_then(|d| d.uts.seconds()) else {
                    continue;
                };
                if cutoff.is_some_and(|cutoff| ts <= cutoff) {
                    reached_cutoff = true;
                    break;
                }
                if policy.matches(&query.title, &query.album, &entry.name, &entry.album.text) {
                    newest_first.push(ts);
                }
            }

            if reached_cutoff || page_len < TRACK_PAGE_LIMIT || page >= max_pages {
                break;
            }
            page += 1;
        }

        // Pages are newest first, but keep the order robust to stray entries.
        newest_first.sort_unstable_by(|a, b| b.cmp(a));
        let times = policy.dedup(&newest_first);
        debug!(pages = page, found = times.len(), "Track history fetched");
        Ok(times)
    }

    /// Entries of the global scrobble stream beyond `watermark`.
    ///
    /// Forward scans return oldest first, backward scans newest first.
    /// A backward scan without a watermark starts at the newest scrobble.
    #[instrument(skip(self))]
    pub async fn query_recent_tracks(
        &self,
        direction: RecentDirection,
        watermark: Option<i64>,
    ) -> Result<Vec<ScrobbleCandidate>> {
        let account = self.account()?;
        let mut candidates: Vec<ScrobbleCandidate> = Vec::new();
        let mut seen: HashSet<(String, String, String)> = HashSet::new();

        let mut page = 1;
        loop {
            if self.shutdown.is_cancelled() {
                debug!(page, "Shutting down, abandoning recent tracks scan");
                break;
            }
            let mut request = Query::new("user.getRecentTracks")
                .api_key(&account.api_key)
                .param("user", &account.username)
                .param("limit", RECENT_PAGE_LIMIT)
                .param("format", "json");
            request = match (direction, watermark) {
                (RecentDirection::Forward, Some(ts)) => request.live_cursor("from", ts),
                (RecentDirection::Forward, None) => request.uncacheable(),
                (RecentDirection::Backward, Some(ts)) => request.param("to", ts),
                (RecentDirection::Backward, None) => request.uncacheable(),
            };
            let request = request.param("page", page);

            let body = self.fetch(&request, TrackKey::UNSCOPED).await;
            let entries = match parse_recent_page(&body) {
                Ok(entries) => entries,
                Err(e) => {
                    log_page_error(request.method(), page, &e);
                    break;
                }
            };

            let page_len = entries.len();
            for entry in entries {
                if entry
                    .attr
                    .as_ref()
                    .and_then(|attr| attr.nowplaying.as_deref())
                    == Some("true")
                {
                    continue;
                }
                let Some(timestamp) = entry.date.as_ref().and_then(|d| d.uts.seconds()) else {
                    continue;
                };

                let (artist, artist_needs_escaping) = escape_quotes(&entry.artist.text);
                let title = entry.name.replace('"', QUOTE_ESCAPE);
                let album = entry.album.text.replace('"', QUOTE_ESCAPE);
                if artist.is_empty() || title.is_empty() {
                    continue;
                }

                if !seen.insert((artist.clone(), title.clone(), album.clone())) {
                    continue;
                }
                candidates.push(ScrobbleCandidate {
                    artist,
                    title,
                    album,
                    timestamp,
                    artist_needs_escaping,
                });
            }

            if page_len < RECENT_PAGE_LIMIT || page >= RECENT_MAX_PAGES {
                break;
            }
            page += 1;
        }

        if direction == RecentDirection::Forward {
            candidates.reverse();
        }
        debug!(pages = page, candidates = candidates.len(), "Recent tracks fetched");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_object_page() {
        let body = br##"{"trackscrobbles":{"track":{"name":"Song","album":{"#text":"LP"},"date":{"uts":"1700000000"}}}}"##;
        let entries = parse_track_page(body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Song");
        assert_eq!(entries[0].album.text, "LP");
        assert_eq!(entries[0].date.as_ref().unwrap().uts.seconds(), Some(1_700_000_000));
    }

    #[test]
    fn test_parse_error_response() {
        let body = br#"{"error":6,"message":"User not found"}"#;
        match parse_track_page(body) {
            Err(MetadataError::RemoteApi { code, message }) => {
                assert_eq!(code, 6);
                assert_eq!(message, "User not found");
            }
            other => panic!("unexpected: {:?}", other.map(|e| e.len())),
        }
    }

    #[test]
    fn test_parse_empty_object_is_missing_key() {
        assert!(matches!(parse_track_page(EMPTY_BODY), Err(MetadataError::JsonParse(_))));
        assert!(matches!(parse_recent_page(b"not json"), Err(MetadataError::JsonParse(_))));
    }

    #[test]
    fn test_parse_numeric_uts() {
        let body = br##"{"recenttracks":{"track":[{"name":"A","artist":{"#text":"B"},"date":{"uts":42}}]}}"##;
        let entries = parse_recent_page(body).unwrap();
        assert_eq!(entries[0].date.as_ref().unwrap().uts.seconds(), Some(42));
    }
}
