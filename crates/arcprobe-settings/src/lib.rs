//! arcprobe Settings Crate
//!
//! Handles firmware checker configuration and persistence of the current firmware
//! result.

pub mod config;
pub mod error;
pub mod persistence;

pub use config::{CheckFirmwareMode, CheckerConfig, DEFAULT_REQUEST_TIMEOUT_MS};
pub use error::{ConfigError, ConfigResult, StoreError, StoreResult};
pub use persistence::FirmwareInfoStore;
