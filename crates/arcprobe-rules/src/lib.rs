//! # arcprobe Rules
//!
//! The firmware rule database: a JSON document describing firmware families, how to
//! recognise them from an identification response, and what is known about each
//! version range. Also provides the PEP 440 / build date range matcher the rules are
//! evaluated with.

pub mod error;
pub mod functions;
pub mod matcher;
pub mod model;
pub mod registry;
pub mod version;

pub use error::{ClauseError, RuleError, RuleResult};
pub use functions::{BuiltinFunction, FunctionKind, FunctionSpec, ResponseView, RuleFunction, Slot};
pub use matcher::{satisfies, satisfies_all, select, CompareMode};
pub use model::{FamilyDocument, FirmwareRule, RuleDocument, RuleSet, VersionEntry};
pub use registry::{DefaultRules, FirmwareRuleRegistry, EMBEDDED_DEFAULTS};
pub use version::Version;
