//! Firmware detection result model
//!
//! [`FirmwareInfo`] is what a detection run produces and what gets persisted as the
//! "current firmware" record. [`ParsedResponse`] is the key/value view of the
//! identification (M115) response that rule functions are evaluated against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Key under which extended capabilities are reported, both in the parsed response
/// and in its serialized form.
pub const CAPABILITIES_KEY: &str = "EXTENDED_CAPABILITIES_REPORT";

/// Key/value view of an identification response
///
/// `fields` holds the `KEY:value` pairs of the first response line. `capabilities`
/// holds `Cap:KEY:VALUE` tokens from the remaining lines (or `X-KEY:VALUE` pairs for
/// comma-separated responses).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedResponse {
    /// Flat fields from the first line
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
    /// Extended capabilities
    #[serde(
        rename = "EXTENDED_CAPABILITIES_REPORT",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub capabilities: BTreeMap<String, String>,
}

impl ParsedResponse {
    /// Create an empty parsed response
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a first-line field
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Get an extended capability
    pub fn capability(&self, key: &str) -> Option<&str> {
        self.capabilities.get(key).map(String::as_str)
    }

    /// Interpret a capability as a `0`/`1` flag
    ///
    /// Any other value is treated as unknown.
    pub fn capability_flag(&self, key: &str) -> Option<bool> {
        match self.capability(key) {
            Some("1") => Some(true),
            Some("0") => Some(false),
            _ => None,
        }
    }

    /// True if neither fields nor capabilities were found
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.capabilities.is_empty()
    }
}

/// Why a detection run did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The request timed out or the printer sent nothing back
    NoResponse,
    /// Lines came back but no key/value pairs could be extracted
    UnparsableResponse,
    /// The response parsed but no firmware family matched
    UnrecognizedFirmware,
}

impl FailureKind {
    /// User-facing message for this failure
    pub fn message(&self) -> &'static str {
        match self {
            Self::NoResponse => {
                "Your printer did not respond to M115, or the request timed out. Unable to detect firmware."
            }
            Self::UnparsableResponse => {
                "Could not parse the M115 response. Unable to detect firmware."
            }
            Self::UnrecognizedFirmware => "This firmware is not recognized.",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoResponse => write!(f, "no response"),
            Self::UnparsableResponse => write!(f, "unparsable response"),
            Self::UnrecognizedFirmware => write!(f, "unrecognized firmware"),
        }
    }
}

/// Result of a firmware detection run
///
/// Tri-state flags use `Option<bool>`: `None` means unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareInfo {
    /// Whether the firmware was identified
    pub success: bool,
    /// Firmware family key from the rule set (e.g. `Marlin`)
    #[serde(rename = "type")]
    pub firmware_type: Option<String>,
    /// Human readable family name
    pub type_name: Option<String>,
    /// Firmware version string as reported or extracted
    pub version: Option<String>,
    /// Firmware build date as reported
    pub build_date: Option<String>,
    /// Range expression of the matched version entry
    pub version_range: Option<String>,
    /// Identifier of the matched version entry
    pub version_guid: Option<String>,
    /// Machine type reported by the printer
    pub printer: Option<String>,
    /// Whether this firmware version is supported
    pub supported: Option<bool>,
    /// Whether this firmware version is recommended
    pub recommended: Option<bool>,
    /// Whether the matched entry describes versions newer than any known release
    pub is_future: Option<bool>,
    /// Notes of the matched version entry
    pub notes: Option<String>,
    /// Notes of the preceding entry, set when the match is a future entry
    pub previous_notes: Option<String>,
    /// Help document for the firmware family
    pub type_help_file: Option<String>,
    /// Help document for the matched version entry
    pub version_help_file: Option<String>,
    /// Help document for the preceding version entry
    pub previous_version_help_file: Option<String>,
    /// User-facing error message when `success` is false
    pub error: Option<String>,
    /// Failure category when `success` is false
    pub failure: Option<FailureKind>,
    /// Raw identification response lines
    pub m115_response: Vec<String>,
    /// Parsed identification response
    pub m115_parsed_response: Option<ParsedResponse>,
    /// Whether G2/G3 commands are understood by the firmware
    pub g2_g3_supported: Option<bool>,
    /// Whether arc support is compiled in and enabled
    pub arcs_enabled: Option<bool>,
    /// When the check completed
    pub last_check_datetime: Option<DateTime<Utc>>,
}

impl FirmwareInfo {
    /// Create an empty result holding the raw response
    pub fn new(response: Vec<String>) -> Self {
        Self {
            m115_response: response,
            ..Self::default()
        }
    }

    /// Mark the result as failed
    pub fn fail(mut self, kind: FailureKind) -> Self {
        self.success = false;
        self.failure = Some(kind);
        self.error = Some(kind.message().to_string());
        self
    }

    /// True if arc support or G2/G3 support is still unknown
    pub fn needs_capability_probe(&self) -> bool {
        self.arcs_enabled.is_none() || self.g2_g3_supported.is_none()
    }

    /// Enabled arcs imply G2/G3 support
    pub fn resolve_g2_g3(&mut self) {
        if self.arcs_enabled == Some(true) {
            self.g2_g3_supported = Some(true);
        }
    }
}
