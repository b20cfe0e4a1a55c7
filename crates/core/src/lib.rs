//! Core utilities shared by every lumen crate.
//!
//! This crate provides:
//! - The workspace error type and result alias
//! - Logging initialization
//! - Engine configuration loaded from TOML
//! - The failure policy applied at the engine boundary
//! - A frame timer for animation and FPS reporting

pub mod config;
mod error;
mod logging;
pub mod policy;
mod timer;

pub use config::{ConfigSource, EngineConfig};
pub use error::{Error, Result};
pub use logging::{DEFAULT_FILTER, init_logging};
pub use policy::FailurePolicy;
pub use timer::FrameTimer;
