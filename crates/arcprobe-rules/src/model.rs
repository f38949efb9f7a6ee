//! Firmware rule document model
//!
//! [`RuleDocument`] is the JSON file as stored on disk. Each family entry is
//! compiled once into a [`FirmwareRule`], with its detection, version and
//! capability functions resolved up front.

use crate::error::{RuleError, RuleResult};
use crate::functions::{BuiltinFunction, FunctionSpec, ResponseView, RuleFunction, Slot};
use crate::matcher::CompareMode;
use serde::{Deserialize, Serialize};

/// The rule document as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDocument {
    /// Version of the rule data itself
    pub version: String,
    /// Families keyed by family key, in document order
    #[serde(default)]
    pub types: serde_json::Map<String, serde_json::Value>,
}

/// One firmware family as written in the rule document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyDocument {
    pub name: String,
    #[serde(default)]
    pub help_file: Option<String>,
    #[serde(default)]
    pub version_compare_type: CompareMode,
    #[serde(default)]
    pub functions: FunctionTable,
    #[serde(default)]
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionTable {
    #[serde(default)]
    pub is_firmware_type: Option<FunctionSpec>,
    #[serde(default, alias = "version")]
    pub get_version: Option<FunctionSpec>,
    #[serde(default, alias = "build_date")]
    pub get_build_date: Option<FunctionSpec>,
    #[serde(default)]
    pub arcs_enabled: Option<FunctionSpec>,
    #[serde(default)]
    pub arcs_not_enabled: Option<FunctionSpec>,
    #[serde(default)]
    pub clean_version: Option<FunctionSpec>,
}

/// A version range within a family and what is known about it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionEntry {
    /// Range expression, e.g. `>=2.0.6,<=2.0.7.2`
    #[serde(alias = "date")]
    pub version: String,
    pub guid: String,
    pub supported: bool,
    pub recommended: bool,
    pub g2_g3_supported: Option<bool>,
    pub arcs_enabled: Option<bool>,
    /// Describes versions newer than any known release
    pub is_future: bool,
    pub notes: Option<String>,
    pub help_file: Option<String>,
}

/// A compiled firmware family
#[derive(Debug, Clone)]
pub struct FirmwareRule {
    pub key: String,
    pub name: String,
    pub help_file: Option<String>,
    pub is_firmware_type: RuleFunction,
    pub get_version: Option<RuleFunction>,
    pub get_build_date: Option<RuleFunction>,
    pub arcs_enabled: Option<RuleFunction>,
    pub arcs_not_enabled: Option<RuleFunction>,
    pub clean_version: Option<BuiltinFunction>,
    pub version_compare_type: CompareMode,
    pub versions: Vec<VersionEntry>,
}

impl FirmwareRule {
    /// Compile a family, resolving every function once
    pub fn compile(key: &str, document: FamilyDocument) -> RuleResult<Self> {
        let invalid = |slot: Slot, reason: String| RuleError::InvalidFunction {
            family: key.to_string(),
            slot: slot.to_string(),
            reason,
        };
        let compile = |slot: Slot, spec: &Option<FunctionSpec>| {
            spec.as_ref()
                .map(|spec| RuleFunction::compile(spec, slot).map_err(|r| invalid(slot, r)))
                .transpose()
        };

        let functions = &document.functions;
        let is_firmware_type = compile(Slot::IsFirmwareType, &functions.is_firmware_type)?
            .ok_or_else(|| invalid(Slot::IsFirmwareType, "missing".to_string()))?;
        let get_version = compile(Slot::GetVersion, &functions.get_version)?;
        let get_build_date = compile(Slot::GetBuildDate, &functions.get_build_date)?;
        let arcs_enabled = compile(Slot::ArcsEnabled, &functions.arcs_enabled)?;
        let arcs_not_enabled = compile(Slot::ArcsNotEnabled, &functions.arcs_not_enabled)?;
        let clean_version = match &functions.clean_version {
            Some(FunctionSpec::Named(name)) => Some(
                BuiltinFunction::resolve(name, Slot::CleanVersion)
                    .map_err(|r| invalid(Slot::CleanVersion, r))?,
            ),
            Some(FunctionSpec::Regex { .. }) => {
                return Err(invalid(
                    Slot::CleanVersion,
                    "a regex cannot be used as clean_version".to_string(),
                ))
            }
            None => None,
        };

        Ok(Self {
            key: key.to_string(),
            name: document.name,
            help_file: document.help_file,
            is_firmware_type,
            get_version,
            get_build_date,
            arcs_enabled,
            arcs_not_enabled,
            clean_version,
            version_compare_type: document.version_compare_type,
            versions: document.versions,
        })
    }

    /// Does the response belong to this family
    pub fn matches(&self, view: &ResponseView<'_>) -> bool {
        self.is_firmware_type.check(view)
    }

    pub fn extract_version(&self, view: &ResponseView<'_>) -> Option<String> {
        self.get_version.as_ref()?.extract(view)
    }

    pub fn extract_build_date(&self, view: &ResponseView<'_>) -> Option<String> {
        self.get_build_date.as_ref()?.extract(view)
    }

    /// Arc support from the family's functions
    ///
    /// `arcs_enabled` is consulted first; `arcs_not_enabled` firing means arcs are
    /// absent. `None` when neither decides.
    pub fn arcs_enabled(&self, view: &ResponseView<'_>) -> Option<bool> {
        if let Some(enabled) = self.arcs_enabled.as_ref().and_then(|f| f.flag(view)) {
            return Some(enabled);
        }
        match self.arcs_not_enabled.as_ref().and_then(|f| f.flag(view)) {
            Some(true) => Some(false),
            _ => None,
        }
    }

    /// Normalize a version string before comparison
    pub fn clean(&self, version: &str) -> String {
        match self.clean_version {
            Some(function) => function.normalize(version),
            None => version.to_string(),
        }
    }
}

/// Compiled rule document
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    version: String,
    families: Vec<FirmwareRule>,
}

impl RuleSet {
    /// Compile a rule document
    ///
    /// Families that fail to deserialize or compile are skipped with an error log;
    /// the remaining families keep their document order.
    pub fn from_document(document: RuleDocument) -> Self {
        let mut families = Vec::with_capacity(document.types.len());
        for (key, value) in document.types {
            let family = serde_json::from_value::<FamilyDocument>(value)
                .map_err(RuleError::from)
                .and_then(|family| FirmwareRule::compile(&key, family));
            match family {
                Ok(family) => families.push(family),
                Err(e) => {
                    tracing::error!("Skipping firmware family '{}': {}", key, e);
                }
            }
        }
        Self {
            version: document.version,
            families,
        }
    }

    /// Parse and compile a rule document from JSON text
    pub fn from_json(text: &str) -> RuleResult<Self> {
        let document: RuleDocument = serde_json::from_str(text)?;
        Ok(Self::from_document(document))
    }

    /// Version of the rule data
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Families in registry order
    pub fn families(&self) -> impl Iterator<Item = &FirmwareRule> {
        self.families.iter()
    }

    pub fn family(&self, key: &str) -> Option<&FirmwareRule> {
        self.families.iter().find(|f| f.key == key)
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "version": "0.1.0",
        "types": {
            "Zeta": {
                "name": "Zeta",
                "functions": { "is_firmware_type": { "regex": "^Zeta", "key": "FIRMWARE_NAME" } },
                "versions": [ { "version": ">=1.0", "guid": "z1", "supported": true } ]
            },
            "Broken": {
                "name": "Broken",
                "functions": { "is_firmware_type": { "regex": "(" } }
            },
            "Unknown": {
                "name": "Unknown",
                "functions": { "is_firmware_type": "check_firmware_repetier" }
            },
            "WrongSlot": {
                "name": "Wrong slot",
                "functions": {
                    "is_firmware_type": "check_firmware_marlin",
                    "get_version": "check_firmware_marlin"
                }
            },
            "NoDetector": {
                "name": "No detector",
                "functions": {}
            },
            "Alpha": {
                "name": "Alpha",
                "help_file": "alpha.md",
                "version_compare_type": "date",
                "functions": {
                    "is_firmware_type": "check_firmware_smoothieware",
                    "build_date": { "regex": "(.*)", "key": "FIRMWARE_BUILD_DATE" }
                },
                "versions": [ { "date": "<Nov 04 2020 00:00:00", "guid": "a1" } ]
            }
        }
    }"#;

    #[test]
    fn test_invalid_families_are_skipped_and_order_kept() {
        let rules = RuleSet::from_json(DOCUMENT).unwrap();
        assert_eq!(rules.version(), "0.1.0");
        let keys: Vec<&str> = rules.families().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["Zeta", "Alpha"]);
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn test_aliases_and_date_mode() {
        let rules = RuleSet::from_json(DOCUMENT).unwrap();
        let alpha = rules.family("Alpha").unwrap();
        assert_eq!(alpha.version_compare_type, CompareMode::Date);
        assert!(alpha.get_build_date.is_some());
        assert_eq!(alpha.versions[0].version, "<Nov 04 2020 00:00:00");
        assert_eq!(alpha.help_file.as_deref(), Some("alpha.md"));
    }

    #[test]
    fn test_version_entry_defaults() {
        let entry: VersionEntry = serde_json::from_str(r#"{"version": "<1.0"}"#).unwrap();
        assert!(!entry.supported);
        assert!(!entry.is_future);
        assert_eq!(entry.arcs_enabled, None);
    }

    #[test]
    fn test_unparsable_document_is_an_error() {
        assert!(RuleSet::from_json("{ not json").is_err());
        assert!(RuleSet::from_json(r#"{"types": {}}"#).is_err());
    }

    #[test]
    fn test_clean_version_must_be_a_normalizer() {
        let family: FamilyDocument = serde_json::from_str(
            r#"{
                "name": "Klipper",
                "functions": {
                    "is_firmware_type": "check_firmware_klipper",
                    "clean_version": { "regex": ".*" }
                }
            }"#,
        )
        .unwrap();
        let err = FirmwareRule::compile("Klipper", family).unwrap_err();
        assert!(matches!(err, RuleError::InvalidFunction { .. }));
    }
}
