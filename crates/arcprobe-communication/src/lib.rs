//! # arcprobe Communication
//!
//! Talks to the printer through the host's command stream. [`RequestChannel`]
//! injects a request and waits for its response; [`FirmwareChecker`] uses it to
//! identify the firmware and work out whether G2/G3 arc moves are available.

pub mod channel;
pub mod detector;
pub mod m115;
pub mod probe;

pub use channel::{
    is_acknowledgement, LinePredicate, PendingRequest, PrinterHost, RequestChannel, MARKER_TAG,
};
pub use detector::{classify_response, CheckPhase, FirmwareChecker};
pub use m115::parse_response;
pub use probe::{
    identification_request, probe_request, ProbeOutcome, IDENTIFY_COMMAND, PROBE_COMMAND,
};
