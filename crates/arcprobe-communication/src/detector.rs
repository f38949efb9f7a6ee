//! Firmware detection
//!
//! [`FirmwareChecker`] drives a detection run: send `M115`, classify the response
//! against the firmware rules, probe with `G2` when arc support is still unknown,
//! then persist the result. [`classify_response`] is the pure classification step.

use crate::channel::RequestChannel;
use crate::m115;
use crate::probe::{identification_request, probe_request, ProbeOutcome};
use arcprobe_core::{CheckError, CheckResult, FailureKind, FirmwareInfo};
use arcprobe_rules::{
    select, CompareMode, DefaultRules, FirmwareRule, FirmwareRuleRegistry, ResponseView,
    RuleResult, RuleSet, VersionEntry,
};
use arcprobe_settings::{CheckFirmwareMode, CheckerConfig, FirmwareInfoStore};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Span;

/// Where a detection run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckPhase {
    #[default]
    Idle,
    RequestSent,
    ResponseCollecting,
    ProbeSent,
    ProbeCollecting,
    Resolved,
}

impl std::fmt::Display for CheckPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::RequestSent => write!(f, "request_sent"),
            Self::ResponseCollecting => write!(f, "response_collecting"),
            Self::ProbeSent => write!(f, "probe_sent"),
            Self::ProbeCollecting => write!(f, "probe_collecting"),
            Self::Resolved => write!(f, "resolved"),
        }
    }
}

/// Classify raw identification response lines against a rule set
///
/// Never fails; problems are reported through `success`, `error` and `failure` on
/// the returned [`FirmwareInfo`].
pub fn classify_response(rules: &RuleSet, lines: &[String]) -> FirmwareInfo {
    let mut info = FirmwareInfo::new(lines.to_vec());
    if lines.is_empty() {
        return info.fail(FailureKind::NoResponse);
    }

    let parsed = m115::parse_response(lines);
    if parsed.is_empty() {
        info.m115_parsed_response = Some(parsed);
        return info.fail(FailureKind::UnparsableResponse);
    }

    info.printer = parsed.get("MACHINE_TYPE").map(str::to_string);
    info.version = parsed.get("FIRMWARE_VERSION").map(str::to_string);
    info.build_date = parsed.capability("FIRMWARE_BUILD_DATE").map(str::to_string);
    info.arcs_enabled = parsed.capability_flag("ARCS");
    info.resolve_g2_g3();

    let view = ResponseView::new(lines, &parsed);
    let Some(family) = rules.families().find(|family| family.matches(&view)) else {
        tracing::warn!(
            "No firmware family matched: {}",
            parsed.get("FIRMWARE_NAME").unwrap_or("unknown")
        );
        info.m115_parsed_response = Some(parsed);
        return info.fail(FailureKind::UnrecognizedFirmware);
    };
    tracing::debug!("Firmware family matched: {}", family.key);

    info.success = true;
    info.firmware_type = Some(family.key.clone());
    info.type_name = Some(family.name.clone());
    info.type_help_file = family.help_file.clone();

    if info.version.is_none() {
        info.version = family.extract_version(&view);
    }
    if info.build_date.is_none() {
        info.build_date = family.extract_build_date(&view);
    }
    if info.arcs_enabled.is_none() {
        info.arcs_enabled = family.arcs_enabled(&view);
        info.resolve_g2_g3();
    }
    info.m115_parsed_response = Some(parsed);

    let compare = match family.version_compare_type {
        CompareMode::Semantic => info.version.as_deref().map(|v| family.clean(v)),
        CompareMode::Date => info.build_date.clone(),
    };
    let Some(compare) = compare else {
        tracing::info!(
            "No {} value to compare for {}, version entry not resolved",
            family.version_compare_type,
            family.key
        );
        return info;
    };

    match select(&compare, &family.versions, family.version_compare_type) {
        Some((index, entry)) => apply_version_entry(&mut info, family, index, entry),
        None => tracing::info!("No version entry of {} matches {}", family.key, compare),
    }
    info
}

fn apply_version_entry(
    info: &mut FirmwareInfo,
    family: &FirmwareRule,
    index: usize,
    entry: &VersionEntry,
) {
    info.version_range = Some(entry.version.clone());
    info.version_guid = Some(entry.guid.clone());
    info.is_future = Some(entry.is_future);
    info.supported = Some(entry.supported);
    info.recommended = Some(entry.recommended);
    if info.arcs_enabled.is_none() {
        info.arcs_enabled = entry.arcs_enabled;
        info.resolve_g2_g3();
    }
    if info.g2_g3_supported.is_none() {
        info.g2_g3_supported = entry.g2_g3_supported;
    }
    info.notes = entry.notes.clone();
    info.version_help_file = entry.help_file.clone();

    if entry.is_future && index > 0 {
        let previous = &family.versions[index - 1];
        info.previous_notes = previous.notes.clone();
        info.previous_version_help_file = previous.help_file.clone();
    }
}

/// Releases the in-progress flag when a run ends
struct CheckingGuard {
    flag: Arc<AtomicBool>,
}

impl CheckingGuard {
    fn claim(flag: &Arc<AtomicBool>) -> CheckResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CheckError::ConcurrentDetectionRejected)?;
        Ok(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for CheckingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Detects the printer's firmware and whether it can execute arc moves
pub struct FirmwareChecker {
    channel: Arc<RequestChannel>,
    registry: Arc<FirmwareRuleRegistry>,
    store: Arc<FirmwareInfoStore>,
    config: CheckerConfig,
    checking: Arc<AtomicBool>,
    phase: Mutex<CheckPhase>,
    span: Span,
}

impl std::fmt::Debug for FirmwareChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirmwareChecker")
            .field("check_firmware", &self.config.check_firmware)
            .field("is_checking", &self.is_checking())
            .field("phase", &self.phase())
            .finish()
    }
}

impl FirmwareChecker {
    pub fn new(
        channel: Arc<RequestChannel>,
        registry: Arc<FirmwareRuleRegistry>,
        store: Arc<FirmwareInfoStore>,
        config: CheckerConfig,
    ) -> Self {
        Self {
            channel,
            registry,
            store,
            config,
            checking: Arc::new(AtomicBool::new(false)),
            phase: Mutex::new(CheckPhase::Idle),
            span: tracing::info_span!("firmware_checker"),
        }
    }

    /// Build a checker from configuration, loading rules and the persisted result
    /// from the configured data directory
    pub fn open(channel: Arc<RequestChannel>, config: CheckerConfig) -> RuleResult<Self> {
        let defaults = match &config.defaults_path {
            Some(path) => DefaultRules::File(path.clone()),
            None => DefaultRules::Embedded,
        };
        let registry = Arc::new(FirmwareRuleRegistry::load(config.rules_path(), defaults)?);
        let store = Arc::new(FirmwareInfoStore::open(config.current_firmware_path()));
        Ok(Self::new(channel, registry, store, config))
    }

    /// Log under `span` instead of the default checker span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Run a detection on the calling thread
    ///
    /// Fails fast with [`CheckError::ConcurrentDetectionRejected`] if another run is
    /// in flight.
    pub fn detect(&self) -> CheckResult<FirmwareInfo> {
        self.ensure_enabled()?;
        let _guard = CheckingGuard::claim(&self.checking)?;
        self.run_detection()
    }

    /// Run a detection on a blocking worker
    ///
    /// The in-progress flag is claimed before this returns, so a second call made
    /// immediately afterwards is rejected. Must be called within a tokio runtime.
    pub fn spawn_detect(
        self: &Arc<Self>,
    ) -> CheckResult<JoinHandle<CheckResult<FirmwareInfo>>> {
        self.ensure_enabled()?;
        let guard = CheckingGuard::claim(&self.checking)?;
        let handle = tokio::runtime::Handle::try_current().map_err(|e| CheckError::Worker {
            reason: e.to_string(),
        })?;
        let checker = Arc::clone(self);
        Ok(handle.spawn_blocking(move || {
            let _guard = guard;
            checker.run_detection()
        }))
    }

    /// Host event: the printer connection became operational
    ///
    /// Starts a detection when configured to check on connect.
    pub fn on_printer_operational(
        self: &Arc<Self>,
    ) -> Option<JoinHandle<CheckResult<FirmwareInfo>>> {
        let _enter = self.span.enter();
        if self.config.check_firmware != CheckFirmwareMode::OnConnect {
            tracing::debug!(
                "Printer operational, firmware check mode is {}",
                self.config.check_firmware
            );
            return None;
        }
        match self.spawn_detect() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!("Firmware check on connect not started: {}", e);
                None
            }
        }
    }

    /// Result of the last successful detection
    pub fn current_result(&self) -> Option<FirmwareInfo> {
        self.store.current()
    }

    pub fn is_checking(&self) -> bool {
        self.checking.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> CheckPhase {
        *self.phase.lock()
    }

    /// Re-read the rule file
    pub fn reload_rules(&self) -> RuleResult<Arc<RuleSet>> {
        self.registry.reload()
    }

    /// Version of the loaded rule data
    pub fn rules_version(&self) -> String {
        self.registry.version()
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    fn ensure_enabled(&self) -> CheckResult<()> {
        if self.config.check_firmware == CheckFirmwareMode::Disabled {
            return Err(CheckError::Disabled);
        }
        Ok(())
    }

    fn set_phase(&self, phase: CheckPhase) {
        let mut current = self.phase.lock();
        tracing::debug!("Firmware check phase: {} -> {}", *current, phase);
        *current = phase;
    }

    fn run_detection(&self) -> CheckResult<FirmwareInfo> {
        let _enter = self.span.enter();
        let result = self.identify();
        self.set_phase(CheckPhase::Idle);
        result
    }

    fn identify(&self) -> CheckResult<FirmwareInfo> {
        tracing::info!("Checking firmware info.");
        let rules = self.registry.rule_set();

        self.set_phase(CheckPhase::RequestSent);
        let request = self
            .channel
            .send(identification_request(), self.config.request_timeout())?;
        self.set_phase(CheckPhase::ResponseCollecting);
        if !request.is_complete() && !request.response.is_empty() {
            tracing::warn!(
                "The M115 response is incomplete, classifying {} line(s)",
                request.response.len()
            );
        }

        let mut info = classify_response(&rules, &request.response);
        if info.success && info.needs_capability_probe() {
            self.probe_capabilities(&mut info);
        }
        self.set_phase(CheckPhase::Resolved);

        if info.success {
            info.last_check_datetime = Some(Utc::now());
            if let Err(e) = self.store.save(&info) {
                tracing::error!("Unable to save the current firmware info: {}", e);
            }
            tracing::info!(
                "Firmware check complete: {} {} (arcs enabled: {:?}, G2/G3 supported: {:?})",
                info.type_name.as_deref().unwrap_or("unknown"),
                info.version.as_deref().unwrap_or("unknown"),
                info.arcs_enabled,
                info.g2_g3_supported
            );
        } else {
            tracing::error!(
                "Firmware check failed: {}",
                info.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(info)
    }

    fn probe_capabilities(&self, info: &mut FirmwareInfo) {
        tracing::info!("Arc support is unknown, sending the G2 probe.");
        self.set_phase(CheckPhase::ProbeSent);
        let request = match self
            .channel
            .send(probe_request(), self.config.probe_timeout())
        {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("The G2 probe could not be sent: {}", e);
                return;
            }
        };
        self.set_phase(CheckPhase::ProbeCollecting);

        let Some(line) = request.response.first() else {
            tracing::info!("No response to the G2 probe.");
            return;
        };
        match ProbeOutcome::classify(line) {
            Some(outcome) if outcome.apply(info) => {
                tracing::info!("G2 probe answered {:?}", outcome);
            }
            _ => tracing::info!("The G2 probe was inconclusive: {}", line),
        }
    }
}
