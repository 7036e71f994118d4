//! Error types for dye-sublimation printer operations.
//!
//! This module defines all possible errors that can occur while parsing a
//! spool job, talking to the printer and driving a job to completion, and
//! the [`Outcome`] each of them maps to for the spooler.

use crate::status;
use rusb;
use std::fmt;
use thiserror::Error;

/// Main error type for printer operations.
///
/// Every variant is job-scoped: the [`Error::outcome`] method tells the
/// caller whether to retry, hold, stop the queue or drop the job.
#[derive(Error, Debug)]
pub enum Error {
    /// USB communication error.
    ///
    /// Wraps underlying rusb errors for device communication issues,
    /// timeouts, or permission problems.
    #[error(transparent)]
    UsbError(#[from] rusb::Error),

    /// Reading the spool stream failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Printer device is not connected or not responding.
    #[error("Device is offline")]
    DeviceOffline,

    #[error("Can't read device list, permission issue ?")]
    DeviceListNotReadable,

    #[error("Device is missing endpoint")]
    MissingEndpoint,

    /// Invalid configuration parameter provided.
    #[error("Invalid configuration parameter: {0}")]
    InvalidConfig(String),

    /// The spool stream does not start with a known job header.
    #[error("Unrecognized data format")]
    UnrecognizedFormat,

    /// The spool stream ended before the declared payload was read.
    #[error("Spool stream truncated: expected {expected} bytes, read {read}")]
    TruncatedStream { expected: usize, read: usize },

    /// A device response had the wrong length.
    #[error("Short read from printer: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    /// Fewer bytes than supplied went out on the wire.
    #[error("Short write to printer: wrote {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },

    /// A device response did not start with the magic of the request.
    #[error("Invalid response header {got:02x?}, expected {expected:02x?}")]
    BadResponse { expected: [u8; 4], got: [u8; 4] },

    /// The job needs color processing but no color engine is attached.
    #[error("Job requires a color processing engine, none available")]
    MissingColorEngine,

    #[error("Image processing failed: {0}")]
    ImageProcessingFailed(String),

    /// Hard error reported by one deck of the printer.
    #[error("Deck {deck}: {fault}")]
    DeviceError { deck: usize, fault: DeviceFault },

    /// No deck holds media this job can be printed on.
    #[error("No deck has media compatible with a {rows} row job")]
    MediaMismatch { rows: u16 },

    /// The printer is online but no online deck can take this job.
    #[error("No online deck has media suitable for this job")]
    NoLegalDeck,

    /// Every deck reports a hard error.
    #[error("All decks are offline: {0}")]
    AllDecksOffline(DeviceFault),

    /// The printer can never hold a job of this size.
    #[error("Job of {columns}x{rows} is too large for the printer")]
    JobTooLarge { columns: u16, rows: u16 },

    /// The printer refused the job header.
    #[error("Printer rejected the job: {0}")]
    JobRejected(String),

    /// The printer is out of free job buffers.
    #[error("Printer memory exhausted")]
    MemoryExhausted { retryable: bool },

    /// All usable decks are busy and the caller asked not to wait.
    #[error("Printer is busy")]
    DeviceBusy,

    /// The printer is still waking up and the caller asked not to wait.
    #[error("Printer is asleep")]
    DeviceAsleep,

    #[error("Transport failure: {0}")]
    TransportFailure(String),
}

impl Error {
    /// Classify the error into the result reported to the spooler.
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::UnrecognizedFormat
            | Self::TruncatedStream { .. }
            | Self::ShortRead { .. }
            | Self::ShortWrite { .. }
            | Self::BadResponse { .. }
            | Self::MissingColorEngine
            | Self::ImageProcessingFailed(_)
            | Self::MediaMismatch { .. }
            | Self::JobTooLarge { .. }
            | Self::JobRejected(_)
            | Self::InvalidConfig(_) => Outcome::Cancel,
            Self::MemoryExhausted { retryable: true } | Self::DeviceBusy | Self::DeviceAsleep => {
                Outcome::RetryCurrent
            }
            Self::MemoryExhausted { retryable: false } => Outcome::Cancel,
            Self::NoLegalDeck => Outcome::Hold,
            Self::DeviceError { .. } | Self::AllDecksOffline(_) => Outcome::Stop,
            Self::UsbError(_)
            | Self::Io(_)
            | Self::DeviceOffline
            | Self::DeviceListNotReadable
            | Self::MissingEndpoint
            | Self::TransportFailure(_) => Outcome::Failed,
        }
    }
}

/// Final result of a job as seen by the spooler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    /// Resource exhaustion, safe to retry right away.
    RetryCurrent,
    /// This job can never succeed.
    Cancel,
    /// Printer online, but no eligible media right now.
    Hold,
    /// The queue should halt.
    Stop,
    /// Unexpected transport or protocol failure.
    Failed,
}

impl Outcome {
    /// CUPS backend exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Failed => 1,
            Self::Hold => 3,
            Self::Stop => 4,
            Self::Cancel => 5,
            Self::RetryCurrent => 7,
        }
    }
}

impl<T> From<&Result<T, Error>> for Outcome {
    fn from(result: &Result<T, Error>) -> Self {
        match result {
            Ok(_) => Outcome::Ok,
            Err(err) => err.outcome(),
        }
    }
}

/// Three byte error code reported per deck.
///
/// Byte 0 is the error class, byte 1 the specific error and byte 2 the
/// recovery the operator has to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceFault {
    code: [u8; 3],
}

impl DeviceFault {
    pub fn new(code: [u8; 3]) -> Self {
        DeviceFault { code }
    }

    /// Parse the error bytes at `offset` of a status buffer.
    pub fn from_buf(buf: &[u8], offset: usize) -> Self {
        DeviceFault {
            code: [buf[offset], buf[offset + 1], buf[offset + 2]],
        }
    }

    pub fn code(&self) -> [u8; 3] {
        self.code
    }

    /// Any nonzero class takes the deck offline.
    pub fn is_hard(&self) -> bool {
        self.code[0] != 0x00
    }

    pub fn class(&self) -> &'static str {
        status::error_class(self.code[0])
    }

    pub fn instance(&self) -> &'static str {
        status::error_instance(self.code[1])
    }

    pub fn recovery(&self) -> &'static str {
        status::error_recovery(self.code[2])
    }
}

impl fmt::Display for DeviceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_hard() {
            return write!(f, "No error");
        }
        write!(
            f,
            "{} ({}) - {} [{:02x} {:02x} {:02x}]",
            self.instance(),
            self.class(),
            self.recovery(),
            self.code[0],
            self.code[1],
            self.code[2]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_rendering() {
        let fault = DeviceFault::new([0x01, 0x04, 0x05]);
        assert!(fault.is_hard());
        assert_eq!(
            fault.to_string(),
            "Ribbon/Paper mismatch (Paper) - Change paper and ribbon [01 04 05]"
        );
        assert_eq!(DeviceFault::default().to_string(), "No error");
    }

    #[test]
    fn test_outcome_mapping() {
        assert_eq!(Error::UnrecognizedFormat.outcome(), Outcome::Cancel);
        assert_eq!(
            Error::TruncatedStream {
                expected: 512,
                read: 3
            }
            .outcome(),
            Outcome::Cancel
        );
        assert_eq!(
            Error::MemoryExhausted { retryable: true }.outcome(),
            Outcome::RetryCurrent
        );
        assert_eq!(Error::NoLegalDeck.outcome(), Outcome::Hold);
        assert_eq!(
            Error::AllDecksOffline(DeviceFault::new([0x02, 0x21, 0x03])).outcome(),
            Outcome::Stop
        );
        assert_eq!(
            Error::TransportFailure("gone".into()).outcome(),
            Outcome::Failed
        );
        assert_eq!(Outcome::Hold.exit_code(), 3);
    }
}
