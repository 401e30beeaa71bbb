//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the sync crates:
//! - Engine configuration (builder, environment loading, validation)
//! - Logging and tracing bootstrap
//! - Event bus for engine notifications

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{ClientCredentials, EngineConfig, EngineConfigBuilder, MatchPolicy};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus};
