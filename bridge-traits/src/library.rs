//! Host Media Library Abstractions
//!
//! The host owns the library index: it knows where tracks live, how to read
//! their tags, how to search them and how to derive a stable identity key.
//! The core consumes those capabilities through the traits in this module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Content-derived fixed-width identity of a track (or of an artist for the
/// artist side records).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackKey(pub u64);

impl TrackKey {
    /// Key used as the cache consumer for queries not tied to one track.
    pub const UNSCOPED: TrackKey = TrackKey(0);
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Location of a library item. A single file may hold several subsongs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackRef {
    pub location: String,
    pub subsong: u32,
}

impl TrackRef {
    pub fn new(location: impl Into<String>, subsong: u32) -> Self {
        Self {
            location: location.into(),
            subsong,
        }
    }
}

/// Tag and play-statistics snapshot of a track.
///
/// `artist`, `album` and `title` are produced with the configured
/// [`FieldPatterns`]. Timestamps are Unix seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub artist: String,
    pub album: String,
    pub title: String,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
    pub date: Option<String>,
    pub length_secs: f64,
    pub first_played: Option<i64>,
    pub last_played: Option<i64>,
    pub added: Option<i64>,
}

/// Formatting patterns for the three matched fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPatterns {
    pub artist: String,
    pub album: String,
    pub title: String,
}

impl Default for FieldPatterns {
    fn default() -> Self {
        Self {
            artist: "%artist%".to_string(),
            album: "%album%".to_string(),
            title: "%title%".to_string(),
        }
    }
}

/// Key derivation scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyScheme {
    /// Artist, album, disc/track number and title, with date normalization.
    Current,
    /// The obsolete scheme without date normalization.
    Legacy,
    /// Normalized artist only.
    Artist,
}

/// How the artist clause of a [`LibraryQuery`] must be evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtistMatch {
    /// Plain equality against the artist tag.
    Exact(String),
    /// The artist contains quote characters that were escaped for the
    /// host query language.
    Escaped(String),
}

impl ArtistMatch {
    pub fn value(&self) -> &str {
        match self {
            ArtistMatch::Exact(value) | ArtistMatch::Escaped(value) => value,
        }
    }
}

/// Structured library search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryQuery {
    pub artist: ArtistMatch,
    pub title: String,
    pub album: Option<String>,
}

/// Derives identity keys for tracks.
pub trait TrackIdentity: Send + Sync {
    /// Compute the key of `track` under `scheme`.
    ///
    /// Returns `None` when the metadata is not sufficient to build a key
    /// (for example no title).
    fn compute_key(
        &self,
        metadata: &TrackMetadata,
        track: &TrackRef,
        scheme: KeyScheme,
    ) -> Option<TrackKey>;
}

/// Reads formatted fields and host play statistics of a track.
#[async_trait]
pub trait MetadataReader: Send + Sync {
    async fn read(&self, track: &TrackRef, patterns: &FieldPatterns) -> Result<TrackMetadata>;
}

/// Searches the full library.
#[async_trait]
pub trait LibrarySearch: Send + Sync {
    /// All tracks matching `query`.
    async fn search(&self, query: &LibraryQuery) -> Result<Vec<TrackRef>>;

    /// Every track in the library.
    async fn all_tracks(&self) -> Result<Vec<TrackRef>>;
}
