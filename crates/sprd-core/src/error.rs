//! Error types for protocol clients.

use thiserror::Error;

use crate::buffer::AccumulatorError;
use crate::hdlc::FramingError;
use crate::transport::TransportError;

/// Result type for protocol client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A response that does not fit the request in flight.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unexpected response: expected 0x{expected:04X}, got 0x{actual:04X}")]
    UnexpectedResponse { expected: u16, actual: u16 },

    #[error("Device reported an error (payload {payload:02X?})")]
    DeviceError { payload: Vec<u8> },

    #[error("Payload length mismatch: expected {expected} bytes, got {actual}")]
    PayloadLength { expected: usize, actual: usize },

    #[error("Response 0x{kind:04X} carries no payload")]
    MissingPayload { kind: u16 },

    #[error("Malformed version response: {0}")]
    MalformedVersion(String),

    #[error("Payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Block range {lba}+{count} runs past the 32-bit LBA space")]
    LbaOutOfRange { lba: u32, count: u32 },
}

/// Error type for protocol client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// USB open/read/write failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Bad frame on the wire.
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    /// Valid frame, wrong answer.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Receive accumulator misuse or overflow.
    #[error("Buffer error: {0}")]
    Buffer(#[from] AccumulatorError),

    /// Writing received data to its destination failed.
    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),
}
