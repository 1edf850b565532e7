//! # Play History Records
//!
//! Owns the persisted per-track play history.
//!
//! ## Overview
//!
//! This module manages:
//! - The `PlayRecord` and `ArtistRecord` models
//! - A versioned binary encoding with a legacy decode path
//! - `RecordStore` / `ArtistStore` over the host's keyed blob storage
//! - One-shot migration between key spaces
//! - Derived statistics and display fields

pub mod codec;
pub mod error;
pub mod migration;
pub mod models;
pub mod repositories;
pub mod stats;

pub use error::{LibraryError, Result};
pub use migration::{plan_transfer, MigrationAction, MigrationReport, SkipReason};
pub use models::{ArtistRecord, PlayRecord, CURRENT_RECORD_VERSION};
pub use repositories::{ArtistStore, RecordStore};
pub use stats::{DisplayField, PlayStats};
