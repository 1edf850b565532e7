//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`
//! - `KeyedBlobStore` and `SettingsStore` backed by SQLite
//! - `TrackIdentity` hashing formatted tags with SHA-256
//! - `MainThreadDispatch` through a queue drained by the host's main loop
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{QueuedDispatcher, ReqwestHttpClient, SqliteBlobStore};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let blobs = SqliteBlobStore::new(Path::new("playcount.db")).await?;
//!     let (dispatcher, queue) = QueuedDispatcher::new();
//!     tokio::spawn(queue.run());
//!
//!     // Use in core configuration
//!     Ok(())
//! }
//! ```

mod blob_store;
mod dispatch;
mod http;
mod identity;
mod settings;
mod sqlite;

pub use blob_store::{RefreshEvent, SqliteBlobStore};
pub use dispatch::{MainThreadQueue, QueuedDispatcher};
pub use http::ReqwestHttpClient;
pub use identity::HashingTrackIdentity;
pub use settings::SqliteSettingsStore;
