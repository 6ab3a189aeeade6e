//! Protocol error types

use thiserror::Error;

/// Errors that can occur while encoding or decoding frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Unknown frame type tag
    #[error("Unknown frame type: {0:#04x}")]
    UnknownFrameType(u8),

    /// Unknown tunnel control method
    #[error("Unknown tunnel method: {0:#04x}")]
    UnknownMethod(u8),

    /// Unknown address kind in a NewSession request
    #[error("Unknown address kind: {0:#04x}")]
    UnknownAddrKind(u8),

    /// Unknown protocol type in a NewSession request
    #[error("Unknown protocol type: {0:#04x}")]
    UnknownProtoType(u8),

    /// Payload exceeds maximum size
    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Domain name does not fit the length-prefixed wire encoding
    #[error("Domain name too long: {0} bytes exceeds 255")]
    DomainTooLong(usize),

    /// Payload ended before the declared structure was complete
    #[error("Truncated payload: expected at least {expected} bytes, got {actual}")]
    TruncatedPayload { expected: usize, actual: usize },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
