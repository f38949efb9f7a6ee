//! Identification and capability probe requests
//!
//! The identification request is `M115`. The capability probe sends a bare `G2`,
//! which a firmware with arc support rejects for missing parameters and a firmware
//! without it rejects as an unknown command.

use crate::channel::{is_acknowledgement, PendingRequest};
use arcprobe_core::FirmwareInfo;

/// Identification command
pub const IDENTIFY_COMMAND: &str = "M115";

/// Capability probe command
pub const PROBE_COMMAND: &str = "G2";

fn first_token_is(command: &str, expected: &str) -> bool {
    command
        .split_whitespace()
        .next()
        .is_some_and(|token| token.eq_ignore_ascii_case(expected))
}

fn is_identify_command(command: &str) -> bool {
    first_token_is(command, IDENTIFY_COMMAND)
}

fn is_probe_command(command: &str) -> bool {
    first_token_is(command, PROBE_COMMAND)
}

fn is_identification_line(line: &str) -> bool {
    line.contains("FIRMWARE_NAME")
}

fn is_probe_reply(line: &str) -> bool {
    ProbeOutcome::classify(line).is_some()
}

/// The M115 request: collect from the `FIRMWARE_NAME` line until `ok`
pub fn identification_request() -> PendingRequest {
    PendingRequest::new(
        IDENTIFY_COMMAND,
        vec![IDENTIFY_COMMAND.to_string()],
        is_identify_command,
        is_identification_line,
    )
    .wait_for_ok(true)
}

/// The G2 probe: the first classifiable line is the whole response
pub fn probe_request() -> PendingRequest {
    PendingRequest::new(
        PROBE_COMMAND,
        vec![PROBE_COMMAND.to_string()],
        is_probe_command,
        is_probe_reply,
    )
    .append_final_response(true)
}

/// How the firmware answered a bare `G2`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Plain `ok`; inconclusive, some firmware acknowledges anything
    Acknowledged,
    /// `Unknown command`; G2/G3 are not available
    UnknownCommand,
    /// `G2/G3 bad parameters`; arcs are compiled in
    BadParameter,
}

impl ProbeOutcome {
    /// Classify a probe reply line
    pub fn classify(line: &str) -> Option<Self> {
        let line = line.trim().to_uppercase();
        if is_acknowledgement(&line) {
            Some(Self::Acknowledged)
        } else if line.starts_with("UNKNOWN") || line.starts_with("ECHO:UNKNOWN") {
            Some(Self::UnknownCommand)
        } else if line.starts_with("G2/G3 BAD PARAMETER")
            || line.starts_with("ECHO:G2/G3 BAD PARAMETER")
        {
            Some(Self::BadParameter)
        } else {
            None
        }
    }

    /// Fill in whatever the firmware info does not know yet
    ///
    /// Returns false when the outcome decides nothing.
    pub fn apply(self, info: &mut FirmwareInfo) -> bool {
        let (arcs, g2_g3) = match self {
            Self::Acknowledged => return false,
            Self::UnknownCommand => (false, false),
            Self::BadParameter => (true, true),
        };
        if info.arcs_enabled.is_none() {
            info.arcs_enabled = Some(arcs);
        }
        if info.g2_g3_supported.is_none() {
            info.g2_g3_supported = Some(g2_g3);
        }
        info.resolve_g2_g3();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_checks() {
        assert!(is_identify_command("M115"));
        assert!(is_identify_command("m115 ; identify"));
        assert!(!is_identify_command("M1150"));
        assert!(is_probe_command("G2"));
        assert!(!is_probe_command("G28"));
        assert!(!is_probe_command(""));
    }

    #[test]
    fn test_classify() {
        assert_eq!(ProbeOutcome::classify("ok"), Some(ProbeOutcome::Acknowledged));
        assert_eq!(
            ProbeOutcome::classify("echo:Unknown command: \"G2\""),
            Some(ProbeOutcome::UnknownCommand)
        );
        assert_eq!(
            ProbeOutcome::classify("G2/G3 bad parameters"),
            Some(ProbeOutcome::BadParameter)
        );
        assert_eq!(ProbeOutcome::classify("T:21.0 /0.0"), None);
    }

    #[test]
    fn test_apply_fills_unknowns_only() {
        let mut info = FirmwareInfo {
            arcs_enabled: Some(false),
            ..FirmwareInfo::default()
        };
        assert!(ProbeOutcome::BadParameter.apply(&mut info));
        assert_eq!(info.arcs_enabled, Some(false));
        assert_eq!(info.g2_g3_supported, Some(true));

        let mut info = FirmwareInfo::default();
        assert!(ProbeOutcome::UnknownCommand.apply(&mut info));
        assert_eq!(info.arcs_enabled, Some(false));
        assert_eq!(info.g2_g3_supported, Some(false));

        let mut info = FirmwareInfo::default();
        assert!(!ProbeOutcome::Acknowledged.apply(&mut info));
        assert!(info.needs_capability_probe());
    }
}
