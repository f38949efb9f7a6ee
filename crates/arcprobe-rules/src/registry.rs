//! Firmware rule registry
//!
//! Loads the working rule file, recreating it from the defaults when it is missing
//! or corrupt, and hands out immutable snapshots of the compiled [`RuleSet`].
//! `reload` swaps the snapshot; detections already running keep the one they took.

use crate::error::{RuleError, RuleResult};
use crate::model::RuleSet;
use parking_lot::RwLock;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Span;

/// Rule document shipped with the crate
pub const EMBEDDED_DEFAULTS: &str = include_str!("../data/types_default.json");

/// Where the default rules come from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DefaultRules {
    /// The document compiled into the crate
    #[default]
    Embedded,
    /// A defaults file on disk
    File(PathBuf),
}

impl DefaultRules {
    fn describe(&self) -> String {
        match self {
            Self::Embedded => "embedded defaults".to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }

    /// Overwrite `target` with the default rules
    fn restore(&self, target: &Path) -> RuleResult<()> {
        let unavailable = |e: io::Error| RuleError::DefaultsUnavailable {
            path: self.describe(),
            reason: e.to_string(),
        };
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tracing::info!("Creating firmware types folder at: {}", parent.display());
                fs::create_dir_all(parent).map_err(unavailable)?;
            }
        }
        match self {
            Self::Embedded => fs::write(target, EMBEDDED_DEFAULTS).map_err(unavailable)?,
            Self::File(source) => {
                fs::copy(source, target).map_err(unavailable)?;
            }
        }
        Ok(())
    }
}

/// Holds the current compiled rule set
#[derive(Debug)]
pub struct FirmwareRuleRegistry {
    path: PathBuf,
    defaults: DefaultRules,
    rules: RwLock<Arc<RuleSet>>,
    span: Span,
}

impl FirmwareRuleRegistry {
    /// Load the rule file at `path`
    pub fn load(path: impl Into<PathBuf>, defaults: DefaultRules) -> RuleResult<Self> {
        let path = path.into();
        let span = tracing::info_span!("firmware_rules", path = %path.display());
        Self::load_in(path, defaults, span)
    }

    /// Load the rule file at `path`, logging under `span`
    pub fn load_in(
        path: impl Into<PathBuf>,
        defaults: DefaultRules,
        span: Span,
    ) -> RuleResult<Self> {
        let path = path.into();
        let rules = {
            let _enter = span.enter();
            load_rule_set(&path, &defaults)?
        };
        Ok(Self {
            path,
            defaults,
            rules: RwLock::new(Arc::new(rules)),
            span,
        })
    }

    /// Re-read the rule file and swap in the result
    pub fn reload(&self) -> RuleResult<Arc<RuleSet>> {
        let _enter = self.span.enter();
        let rules = Arc::new(load_rule_set(&self.path, &self.defaults)?);
        *self.rules.write() = Arc::clone(&rules);
        tracing::info!(
            "Firmware rules reloaded. Version: {}, families: {}",
            rules.version(),
            rules.len()
        );
        Ok(rules)
    }

    /// Snapshot of the current rule set
    pub fn rule_set(&self) -> Arc<RuleSet> {
        Arc::clone(&self.rules.read())
    }

    /// Version string declared by the current rule document
    pub fn version(&self) -> String {
        self.rules.read().version().to_string()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_rule_file(path: &Path) -> RuleResult<RuleSet> {
    let text = fs::read_to_string(path)?;
    RuleSet::from_json(&text).map_err(|e| RuleError::RuleFileCorrupt {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn load_rule_set(path: &Path, defaults: &DefaultRules) -> RuleResult<RuleSet> {
    tracing::info!("Loading firmware types from: {}", path.display());
    match read_rule_file(path) {
        Ok(rules) => return Ok(rules),
        Err(RuleError::IoError(e)) if e.kind() == io::ErrorKind::NotFound => {
            tracing::info!("The firmware types file does not exist. Creating from defaults.");
        }
        Err(e) => {
            tracing::error!("{}. Recreating from {}.", e, defaults.describe());
        }
    }

    defaults.restore(path)?;
    read_rule_file(path).map_err(|e| RuleError::DefaultsUnavailable {
        path: defaults.describe(),
        reason: e.to_string(),
    })
}
