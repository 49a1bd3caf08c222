//! Server error types.

use pairlink_proto::ProtocolError;

/// Errors produced by the server driver and runtime.
#[derive(Debug)]
pub enum ServerError {
    /// No connection exists for the given peer id.
    PeerNotFound(u64),

    /// A connection failed at the link layer.
    ConnectionFailed {
        /// Peer whose connection failed.
        peer_id: u64,
        /// Failure description.
        reason: String,
    },

    /// A frame violated the wire protocol.
    Protocol(ProtocolError),

    /// Invalid configuration (bind address, TLS material).
    Config(String),

    /// Transport-level failure.
    Transport(String),

    /// Internal invariant violation.
    Internal(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PeerNotFound(peer_id) => write!(f, "peer not found: {peer_id}"),
            Self::ConnectionFailed { peer_id, reason } => {
                write!(f, "connection failed for peer {peer_id}: {reason}")
            },
            Self::Protocol(err) => write!(f, "protocol error: {err}"),
            Self::Config(reason) => write!(f, "configuration error: {reason}"),
            Self::Transport(reason) => write!(f, "transport error: {reason}"),
            Self::Internal(reason) => write!(f, "internal error: {reason}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Protocol(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}
