//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the play-history core:
//! - Logging and tracing infrastructure
//! - Bridge wiring (`CoreConfig`)
//! - Persisted user preferences (`PlaycountConfig`, `ConfigStore`)

pub mod config;
pub mod error;
pub mod logging;
pub mod settings;

pub use config::{CoreConfig, EngineTuning};
pub use error::{Error, Result};
pub use settings::{ConfigStore, PlaycountConfig, SharedConfig};
