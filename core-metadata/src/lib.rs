//! # Remote History Module
//!
//! Reads scrobble history from the remote service and decides which remote
//! entries belong to a local track.
//!
//! ## Overview
//!
//! This module handles:
//! - Query construction and fingerprinting
//! - A consume-once LRU response cache
//! - The Last.fm client (per-track history and the recent-tracks stream)
//! - Fuzzy field matching and near-duplicate scrobble filtering

pub mod cache;
pub mod error;
pub mod matching;
pub mod providers;
pub mod query;

pub use cache::{CacheLookup, ResponseCache};
pub use error::{MetadataError, Result};
pub use matching::{dedup_filter, fields_equal, normalize_field, MatchPolicy};
pub use providers::lastfm::{
    LastFmClient, RecentDirection, ScrobbleCandidate, TrackQuery,
};
pub use query::{fingerprint, Query};
