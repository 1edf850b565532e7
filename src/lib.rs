//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates. Host applications can depend on `playcount-workspace` and
//! enable the documented features without wiring each crate individually.
//!
//! ## Features
//!
//! - `desktop-shims` (default): desktop adapters from `bridge-desktop` for
//!   HTTP, SQLite storage, track identity and main-thread dispatch.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
