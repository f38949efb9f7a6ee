//! # arcprobe
//!
//! Detects a 3D printer's firmware and whether it can execute G2/G3 arc moves.
//!
//! ## Architecture
//!
//! arcprobe is organized as a workspace with multiple crates:
//!
//! 1. **arcprobe-core** - Error types and the `FirmwareInfo` result model
//! 2. **arcprobe-rules** - Firmware rule database and version range matching
//! 3. **arcprobe-communication** - Request channel, M115 parsing, firmware checker
//! 4. **arcprobe-settings** - Checker configuration and result persistence
//! 5. **arcprobe** - CLI that integrates all crates
//!
//! ## Usage
//!
//! A host that owns the printer's command stream implements [`PrinterHost`], wires its
//! stream events to [`RequestChannel::on_command_about_to_send`] and
//! [`RequestChannel::on_response_line`], and calls
//! [`FirmwareChecker::on_printer_operational`] once the connection is up.

pub use arcprobe_communication::{
    classify_response, identification_request, is_acknowledgement, parse_response,
    probe_request, CheckPhase, FirmwareChecker, LinePredicate, PendingRequest, PrinterHost,
    ProbeOutcome, RequestChannel, MARKER_TAG,
};

pub use arcprobe_core::{
    ChannelError, CheckError, CheckResult, FailureKind, FirmwareInfo, ParsedResponse,
};

pub use arcprobe_rules::{
    CompareMode, DefaultRules, FirmwareRule, FirmwareRuleRegistry, RuleError, RuleResult,
    RuleSet, VersionEntry, EMBEDDED_DEFAULTS,
};

pub use arcprobe_settings::{
    CheckFirmwareMode, CheckerConfig, ConfigError, FirmwareInfoStore, StoreError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting on stderr, leaving stdout for results
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
