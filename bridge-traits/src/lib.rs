//! # Host Bridge Traits
//!
//! Contracts between the play-history core and the host application.
//!
//! ## Overview
//!
//! The core reconciles local play history with a remote scrobbling service.
//! Everything it needs from the outside world is expressed as a trait here so
//! that each host can plug in its own implementation.
//!
//! ## Traits
//!
//! ### Library
//! - [`TrackIdentity`](library::TrackIdentity) - Content-derived track keys
//! - [`MetadataReader`](library::MetadataReader) - Formatted tags and host play statistics
//! - [`LibrarySearch`](library::LibrarySearch) - Structured search over the library
//!
//! ### Storage
//! - [`KeyedBlobStore`](storage::KeyedBlobStore) - Opaque per-key blobs and refresh notifications
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences storage
//!
//! ### Platform Integration
//! - [`HttpClient`](http::HttpClient) - Abortable `GET` transport
//! - [`MainThreadDispatch`](dispatch::MainThreadDispatch) - Run work on the UI thread
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with a descriptive error when a required capability
//! was not injected:
//!
//! ```ignore
//! let http_client = config.http_client
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "HttpClient".to_string(),
//!         message: "No HTTP client implementation provided.".to_string(),
//!     })?;
//! ```
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across worker tasks.

pub mod dispatch;
pub mod error;
pub mod http;
pub mod library;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use dispatch::{MainThreadDispatch, MainThreadTask};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use library::{
    ArtistMatch, FieldPatterns, KeyScheme, LibraryQuery, LibrarySearch, MetadataReader,
    TrackIdentity, TrackKey, TrackMetadata, TrackRef,
};
pub use storage::{CollectionId, KeyedBlobStore, SettingsStore};
pub use time::{Clock, FixedClock, SystemClock};
