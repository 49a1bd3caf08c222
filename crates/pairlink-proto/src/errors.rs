//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding frames and payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Buffer too short to contain a frame header.
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum number of bytes required
        expected: usize,
        /// Number of bytes available
        actual: usize,
    },

    /// Header payload size claims more bytes than the buffer holds.
    #[error("frame truncated: header claims {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Payload bytes the header claims
        expected: usize,
        /// Payload bytes actually present
        actual: usize,
    },

    /// Magic number mismatch.
    #[error("invalid magic number")]
    InvalidMagic,

    /// Protocol version not supported by this implementation.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Payload exceeds the protocol size limit.
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Claimed or actual payload size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Opcode not recognized or not valid for this operation.
    #[error("unknown opcode: {0:#06x}")]
    UnknownOpcode(u16),

    /// CBOR serialization failure.
    #[error("CBOR encode error: {0}")]
    CborEncode(String),

    /// CBOR deserialization failure.
    #[error("CBOR decode error: {0}")]
    CborDecode(String),
}
