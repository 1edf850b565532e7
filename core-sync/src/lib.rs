//! # Reconciliation Module
//!
//! Keeps local play records in step with the remote scrobble history.
//!
//! ## Overview
//!
//! This module manages:
//! - Per-track remote pulls and their merge into the record store
//! - Backfill sweeps over the recent-tracks stream
//! - Sweep watermarks and their persistence
//! - Batched refresh notifications on the host's main thread
//! - Playback hooks and the manual force-fetch / clear actions
//!
//! ## Components
//!
//! - **Engine** (`engine`): [`ReconciliationEngine`], the public entry point
//! - **Worker Pool** (`worker`): Bounded task execution with drain-on-close
//! - **Rate Limiter** (`rate_limit`): Burst-then-delay request pacing
//! - **Pending Refresh** (`refresh`): Thresholded refresh batching
//! - **Watermarks** (`watermarks`): Monotonic sweep progress

pub mod engine;
pub mod error;
pub mod rate_limit;
pub mod refresh;
pub mod watermarks;
pub mod worker;

pub use engine::{
    BatchReport, EngineDependencies, ReconciliationEngine, SweepOutcome, SweepReport,
};
pub use error::{Result, SyncError};
pub use rate_limit::RateLimiter;
pub use refresh::PendingRefresh;
pub use watermarks::Watermarks;
pub use worker::WorkerPool;
