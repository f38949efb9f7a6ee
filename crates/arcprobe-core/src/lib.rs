//! # arcprobe Core
//!
//! Core types shared by the arcprobe crates: the error taxonomy for firmware
//! checks and the [`FirmwareInfo`] result model.

pub mod error;
pub mod info;

pub use error::{ChannelError, CheckError, CheckResult};
pub use info::{FailureKind, FirmwareInfo, ParsedResponse, CAPABILITIES_KEY};
