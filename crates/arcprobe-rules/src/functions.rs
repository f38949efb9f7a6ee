//! Rule functions
//!
//! A family's functions are either regular expressions declared in the rule
//! document or references to the closed table of built-in functions below. Both are
//! resolved once when the rule document is loaded.

use arcprobe_core::ParsedResponse;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// A function as written in the rule document
///
/// Either a bare built-in name or `{"regex": "...", "key": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FunctionSpec {
    Named(String),
    Regex {
        regex: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
}

/// What a built-in function computes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Does the response belong to this family
    Detect,
    /// Extract a version string
    Version,
    /// Read arc support from the reported capabilities
    Capability,
    /// Rewrite a version string before comparison
    Normalize,
}

/// The function slots of a firmware family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    IsFirmwareType,
    GetVersion,
    GetBuildDate,
    ArcsEnabled,
    ArcsNotEnabled,
    CleanVersion,
}

impl Slot {
    /// The built-in kind this slot accepts
    pub fn accepts(self) -> FunctionKind {
        match self {
            Self::IsFirmwareType => FunctionKind::Detect,
            Self::GetVersion | Self::GetBuildDate => FunctionKind::Version,
            Self::ArcsEnabled => FunctionKind::Capability,
            Self::ArcsNotEnabled => FunctionKind::Detect,
            Self::CleanVersion => FunctionKind::Normalize,
        }
    }

    /// Whether a regular expression may fill this slot
    pub fn allows_regex(self) -> bool {
        self != Self::CleanVersion
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IsFirmwareType => "is_firmware_type",
            Self::GetVersion => "get_version",
            Self::GetBuildDate => "get_build_date",
            Self::ArcsEnabled => "arcs_enabled",
            Self::ArcsNotEnabled => "arcs_not_enabled",
            Self::CleanVersion => "clean_version",
        };
        write!(f, "{}", name)
    }
}

/// Code-backed rule functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinFunction {
    CheckFirmwarePrusa,
    GetVersionPrusa,
    CheckFirmwarePrusaBuddy,
    GetVersionPrusaBuddy,
    CheckFirmwareMarlin,
    GetVersionMarlin,
    GetArcsEnabledMarlin,
    CheckFirmwareVirtualMarlin,
    GetVersionVirtualMarlin,
    GetArcsEnabledVirtualMarlin,
    CheckFirmwareKlipper,
    GetVersionKlipper,
    CleanVersionKlipper,
    CheckFirmwareSmoothieware,
}

impl BuiltinFunction {
    pub const ALL: [BuiltinFunction; 14] = [
        Self::CheckFirmwarePrusa,
        Self::GetVersionPrusa,
        Self::CheckFirmwarePrusaBuddy,
        Self::GetVersionPrusaBuddy,
        Self::CheckFirmwareMarlin,
        Self::GetVersionMarlin,
        Self::GetArcsEnabledMarlin,
        Self::CheckFirmwareVirtualMarlin,
        Self::GetVersionVirtualMarlin,
        Self::GetArcsEnabledVirtualMarlin,
        Self::CheckFirmwareKlipper,
        Self::GetVersionKlipper,
        Self::CleanVersionKlipper,
        Self::CheckFirmwareSmoothieware,
    ];

    /// Name used in the rule document
    pub fn name(self) -> &'static str {
        match self {
            Self::CheckFirmwarePrusa => "check_firmware_prusa",
            Self::GetVersionPrusa => "get_version_prusa",
            Self::CheckFirmwarePrusaBuddy => "check_firmware_prusa_buddy",
            Self::GetVersionPrusaBuddy => "get_version_prusa_buddy",
            Self::CheckFirmwareMarlin => "check_firmware_marlin",
            Self::GetVersionMarlin => "get_version_marlin",
            Self::GetArcsEnabledMarlin => "get_arcs_enabled_marlin",
            Self::CheckFirmwareVirtualMarlin => "check_firmware_virtual_marlin",
            Self::GetVersionVirtualMarlin => "get_version_virtual_marlin",
            Self::GetArcsEnabledVirtualMarlin => "get_arcs_enabled_virtual_marlin",
            Self::CheckFirmwareKlipper => "check_firmware_klipper",
            Self::GetVersionKlipper => "get_version_klipper",
            Self::CleanVersionKlipper => "clean_version_klipper",
            Self::CheckFirmwareSmoothieware => "check_firmware_smoothieware",
        }
    }

    pub fn kind(self) -> FunctionKind {
        match self {
            Self::CheckFirmwarePrusa
            | Self::CheckFirmwarePrusaBuddy
            | Self::CheckFirmwareMarlin
            | Self::CheckFirmwareVirtualMarlin
            | Self::CheckFirmwareKlipper
            | Self::CheckFirmwareSmoothieware => FunctionKind::Detect,
            Self::GetVersionPrusa
            | Self::GetVersionPrusaBuddy
            | Self::GetVersionMarlin
            | Self::GetVersionVirtualMarlin
            | Self::GetVersionKlipper => FunctionKind::Version,
            Self::GetArcsEnabledMarlin | Self::GetArcsEnabledVirtualMarlin => {
                FunctionKind::Capability
            }
            Self::CleanVersionKlipper => FunctionKind::Normalize,
        }
    }

    /// Look up a built-in by name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Look up a built-in by name and check it fits the slot
    pub fn resolve(name: &str, slot: Slot) -> Result<Self, String> {
        let function = Self::from_name(name)
            .ok_or_else(|| format!("unknown function '{}'. You may be running an old version", name))?;
        if function.kind() != slot.accepts() {
            return Err(format!(
                "'{}' is a {:?} function and cannot be used as {}",
                name,
                function.kind(),
                slot
            ));
        }
        Ok(function)
    }

    fn detect(self, parsed: &ParsedResponse) -> bool {
        let Some(name) = parsed.get("FIRMWARE_NAME").filter(|n| !n.is_empty()) else {
            return false;
        };
        match self {
            Self::CheckFirmwarePrusa => {
                name.starts_with("Prusa-Firmware") && !name.starts_with("Prusa-Firmware-Buddy")
            }
            Self::CheckFirmwarePrusaBuddy => name.starts_with("Prusa-Firmware-Buddy"),
            Self::CheckFirmwareMarlin => name.starts_with("Marlin"),
            Self::CheckFirmwareVirtualMarlin => name.starts_with("Virtual Marlin"),
            Self::CheckFirmwareKlipper => name.starts_with("Klipper"),
            Self::CheckFirmwareSmoothieware => name.starts_with("Smoothieware"),
            _ => false,
        }
    }

    fn version(self, parsed: &ParsedResponse) -> Option<String> {
        let prefix = match self {
            Self::GetVersionPrusa => "Prusa-Firmware",
            Self::GetVersionPrusaBuddy => "Prusa-Firmware-Buddy",
            Self::GetVersionMarlin => "Marlin",
            Self::GetVersionKlipper => "Klipper",
            Self::GetVersionVirtualMarlin => {
                return version_after(parsed.get("FIRMWARE_NAME")?, "Virtual Marlin");
            }
            _ => return None,
        };
        if let Some(version) = parsed.get("FIRMWARE_VERSION") {
            return Some(version.to_string());
        }
        version_after(parsed.get("FIRMWARE_NAME")?, prefix)
    }

    fn capability(self, parsed: &ParsedResponse) -> Option<bool> {
        match self {
            Self::GetArcsEnabledMarlin | Self::GetArcsEnabledVirtualMarlin => {
                parsed.capability_flag("ARCS")
            }
            _ => None,
        }
    }

    /// Rewrite a version string before comparison
    pub fn normalize(self, version: &str) -> String {
        match self {
            Self::CleanVersionKlipper => clean_version_klipper(version),
            _ => version.to_string(),
        }
    }
}

/// `<prefix><whitespace><version>`, the version running to the next whitespace
fn version_after(name: &str, prefix: &str) -> Option<String> {
    let rest = name.strip_prefix(prefix)?;
    let mut chars = rest.chars();
    if !chars.next()?.is_whitespace() {
        return None;
    }
    let version: String = chars.take_while(|c| !c.is_whitespace()).collect();
    (!version.is_empty()).then_some(version)
}

/// Klipper's `git describe` versions (`v0.9.1-564-gabc`) become local versions
/// (`v0.9.1+564-gabc`): the first `-` after the second `.` turns into `+`.
fn clean_version_klipper(version: &str) -> String {
    let dash = (|| {
        let first = version.find('.')?;
        let second = first + 1 + version[first + 1..].find('.')?;
        Some(second + 1 + version[second + 1..].find('-')?)
    })();
    match dash {
        Some(pos) => format!("{}+{}", &version[..pos], &version[pos + 1..]),
        None => version.to_string(),
    }
}

/// The identification response as seen by rule functions
#[derive(Debug, Clone, Copy)]
pub struct ResponseView<'a> {
    pub lines: &'a [String],
    pub parsed: &'a ParsedResponse,
}

impl<'a> ResponseView<'a> {
    pub fn new(lines: &'a [String], parsed: &'a ParsedResponse) -> Self {
        Self { lines, parsed }
    }

    /// Text a regex runs against: the keyed field, or every raw line joined by `\n`
    fn text(&self, key: Option<&str>) -> Option<Cow<'a, str>> {
        match key {
            Some(key) => self
                .parsed
                .get(key)
                .or_else(|| self.parsed.capability(key))
                .map(Cow::Borrowed),
            None => Some(Cow::Owned(self.lines.join("\n"))),
        }
    }
}

/// A compiled rule function
#[derive(Debug, Clone)]
pub enum RuleFunction {
    Regex { pattern: Regex, key: Option<String> },
    Builtin(BuiltinFunction),
}

impl RuleFunction {
    /// Compile a document function for a slot
    pub fn compile(spec: &FunctionSpec, slot: Slot) -> Result<Self, String> {
        match spec {
            FunctionSpec::Named(name) => BuiltinFunction::resolve(name, slot).map(Self::Builtin),
            FunctionSpec::Regex { .. } if !slot.allows_regex() => {
                Err(format!("a regex cannot be used as {}", slot))
            }
            FunctionSpec::Regex { regex, key } => {
                let pattern =
                    Regex::new(regex).map_err(|e| format!("invalid regex '{}': {}", regex, e))?;
                Ok(Self::Regex {
                    pattern,
                    key: key.clone(),
                })
            }
        }
    }

    /// Unanchored search, or a built-in detector
    pub fn check(&self, view: &ResponseView<'_>) -> bool {
        match self {
            Self::Regex { pattern, key } => view
                .text(key.as_deref())
                .is_some_and(|text| pattern.is_match(&text)),
            Self::Builtin(function) => function.detect(view.parsed),
        }
    }

    /// Extract a value
    ///
    /// A regex must match at the start of the text; the first capture group is
    /// returned, or the whole match when the pattern has no group.
    pub fn extract(&self, view: &ResponseView<'_>) -> Option<String> {
        match self {
            Self::Regex { pattern, key } => {
                let text = view.text(key.as_deref())?;
                let captures = pattern.captures(&text)?;
                let whole = captures.get(0)?;
                if whole.start() != 0 {
                    return None;
                }
                let found = if pattern.captures_len() > 1 {
                    captures.get(1)?
                } else {
                    whole
                };
                Some(found.as_str().to_string())
            }
            Self::Builtin(function) => function.version(view.parsed),
        }
    }

    /// Tri-state flag: `Some(true)` when the function fires
    pub fn flag(&self, view: &ResponseView<'_>) -> Option<bool> {
        match self {
            Self::Regex { .. } => self.check(view).then_some(true),
            Self::Builtin(function) => match function.kind() {
                FunctionKind::Capability => function.capability(view.parsed),
                FunctionKind::Detect => function.detect(view.parsed).then_some(true),
                _ => None,
            },
        }
    }
}
