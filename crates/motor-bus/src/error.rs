use crate::driver::DriverState;
use bus_transport::TransportError;
use thiserror::Error;

pub type Result<T, E = ProtocolError> = core::result::Result<T, E>;

/// Failure of a single register exchange.
///
/// A device-reported fault is not an error: it arrives as a non-`None`
/// [`ErrorCode`](crate::ErrorCode) inside a valid record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("checksum mismatch: received 0x{received:02X}, computed 0x{computed:02X}")]
    ChecksumMismatch { received: u8, computed: u8 },
    #[error("record length mismatch: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("{operation} not allowed while {state}")]
    InvalidState {
        state: DriverState,
        operation: &'static str,
    },
    #[error("start-up failed during {step}: {source}")]
    Startup {
        step: &'static str,
        source: ProtocolError,
    },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("driver worker is no longer running")]
    WorkerGone,
}
