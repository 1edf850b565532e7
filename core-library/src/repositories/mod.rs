//! # Record Stores
//!
//! Typed access to the blobs kept by the host's [`KeyedBlobStore`].
//!
//! - `RecordStore` - Per-track play history, with a store-wide write lock
//! - `ArtistStore` - Per-artist last-played side records
//!
//! [`KeyedBlobStore`]: bridge_traits::KeyedBlobStore

pub mod artist;
pub mod record;

pub use artist::ArtistStore;
pub use record::RecordStore;
