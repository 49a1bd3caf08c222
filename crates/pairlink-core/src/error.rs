//! Error types for the link layer.
//!
//! Strongly-typed errors for the per-connection state machine. We avoid using
//! `std::io::Error` for protocol logic; conversion happens only at the
//! transport boundary.

use std::{io, time::Duration};

use thiserror::Error;

use crate::link::LinkState;

/// Errors that can occur during link state machine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Received unexpected frame for current state
    #[error("unexpected frame: received opcode {opcode:#06x} in state {state:?}")]
    UnexpectedFrame {
        /// Current state when frame was received
        state: LinkState,
        /// Opcode of the unexpected frame
        opcode: u16,
    },

    /// Handshake did not complete within timeout
    #[error("handshake timeout after {elapsed:?}")]
    HandshakeTimeout {
        /// How long we waited
        elapsed: Duration,
    },

    /// Link idle timeout exceeded
    #[error("idle timeout after {elapsed:?}")]
    IdleTimeout {
        /// How long the link was idle
        elapsed: Duration,
    },

    /// Unsupported protocol version
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Invalid payload for opcode
    #[error("invalid payload: expected {expected} for opcode {opcode:#06x}")]
    InvalidPayload {
        /// Expected payload type
        expected: &'static str,
        /// Opcode that was received
        opcode: u16,
    },

    /// Protocol error from frame parsing/validation
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Underlying transport error
    #[error("transport error: {0}")]
    Transport(String),
}

impl LinkError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Protocol violations (invalid frames, unsupported versions) are never
    /// transient; they indicate a broken or malicious peer.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::HandshakeTimeout { .. } | Self::IdleTimeout { .. })
    }
}

/// Convert `LinkError` to `io::Error` at the transport boundary.
impl From<LinkError> for io::Error {
    fn from(err: LinkError) -> Self {
        let kind = match &err {
            LinkError::HandshakeTimeout { .. } | LinkError::IdleTimeout { .. } => {
                io::ErrorKind::TimedOut
            },
            LinkError::UnexpectedFrame { .. }
            | LinkError::UnsupportedVersion(_)
            | LinkError::Protocol(_)
            | LinkError::InvalidPayload { .. } => io::ErrorKind::InvalidData,
            LinkError::Transport(_) => io::ErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<pairlink_proto::ProtocolError> for LinkError {
    fn from(err: pairlink_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<io::Error> for LinkError {
    fn from(err: io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_errors_are_transient() {
        assert!(LinkError::HandshakeTimeout { elapsed: Duration::from_secs(31) }.is_transient());
        assert!(LinkError::IdleTimeout { elapsed: Duration::from_secs(61) }.is_transient());
    }

    #[test]
    fn protocol_violations_are_fatal() {
        assert!(
            !LinkError::UnexpectedFrame { state: LinkState::Init, opcode: 0x03 }.is_transient()
        );
        assert!(!LinkError::UnsupportedVersion(99).is_transient());
        assert!(!LinkError::InvalidPayload { expected: "Hello", opcode: 0x01 }.is_transient());
        assert!(!LinkError::Protocol("test error".to_string()).is_transient());
        assert!(!LinkError::Transport("network error".to_string()).is_transient());
    }
}
