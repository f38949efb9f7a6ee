//! Error handling for arcprobe
//!
//! Only two conditions are surfaced to callers as errors:
//! - the printer is busy printing, so no diagnostic request may be injected
//! - another firmware check is already running
//!
//! Everything else that can go wrong during a check (no response, an unparsable
//! response, an unknown firmware) is reported inside a
//! [`FirmwareInfo`](crate::FirmwareInfo) with `success == false`, so callers always
//! get a value back.

use thiserror::Error;

/// Request channel error type
///
/// Raised by the request/response bridge when a request cannot be injected into
/// the command stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The host reports a print in progress; the request was refused, not queued.
    #[error("Cannot send a request to the printer while printing")]
    PrintingInProgress,
}

/// Firmware check error type
///
/// Raised by the firmware checker when a detection run is refused outright.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    /// The printer is busy printing.
    #[error("Cannot check firmware while printing")]
    PrintingInProgress,

    /// A detection run is already in flight.
    #[error("A firmware check is already in progress")]
    ConcurrentDetectionRejected,

    /// Firmware checking is disabled by configuration.
    #[error("Firmware checking is disabled")]
    Disabled,

    /// The detection worker could not be started or did not finish.
    #[error("Firmware check worker failed: {reason}")]
    Worker {
        /// The reason the worker failed.
        reason: String,
    },
}

impl CheckError {
    /// Check if the printer was busy
    pub fn is_printing(&self) -> bool {
        matches!(self, CheckError::PrintingInProgress)
    }

    /// Check if the run was rejected because another one is in flight
    pub fn is_concurrent_rejection(&self) -> bool {
        matches!(self, CheckError::ConcurrentDetectionRejected)
    }
}

impl From<ChannelError> for CheckError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::PrintingInProgress => CheckError::PrintingInProgress,
        }
    }
}

/// Result type for firmware checks
pub type CheckResult<T> = std::result::Result<T, CheckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            CheckError::ConcurrentDetectionRejected.to_string(),
            "A firmware check is already in progress"
        );
        assert_eq!(
            ChannelError::PrintingInProgress.to_string(),
            "Cannot send a request to the printer while printing"
        );
        let err = CheckError::Worker {
            reason: "panicked".to_string(),
        };
        assert_eq!(err.to_string(), "Firmware check worker failed: panicked");
    }

    #[test]
    fn test_channel_error_conversion() {
        let err: CheckError = ChannelError::PrintingInProgress.into();
        assert!(err.is_printing());
        assert!(!err.is_concurrent_rejection());
    }
}
