//! Pairlink wire protocol.
//!
//! A frame is a fixed 48-byte raw binary header followed by a variable-length
//! payload. The header carries everything the server needs to route a frame
//! (opcode, sender, target, session id), so relayed signaling and chat
//! payloads are forwarded without ever being deserialized. Structured
//! payloads (handshake, match notifications, errors) are CBOR.
//!
//! # Layers
//!
//! - [`FrameHeader`] / [`Frame`]: transport framing, zero-copy header parse
//! - [`Opcode`]: operation codes, one per message kind
//! - [`Payload`]: typed CBOR payloads for the non-opaque opcodes

#![forbid(unsafe_code)]

pub mod errors;
mod frame;
mod header;
pub mod payloads;

pub use errors::ProtocolError;
pub use frame::Frame;
pub use header::FrameHeader;
pub use payloads::Payload;

/// ALPN protocol identifier negotiated during the TLS handshake.
pub const ALPN_PROTOCOL: &[u8] = b"pairlink";

/// Operation codes identifying the payload type of a frame.
///
/// Grouped by concern: link management (0x000x), matchmaking (0x001x),
/// signaling relay (0x002x), chat (0x003x), errors (0x00FF).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Client handshake open
    Hello = 0x0001,
    /// Server handshake reply carrying the assigned peer id
    HelloReply = 0x0002,
    /// Keepalive probe
    Ping = 0x0003,
    /// Keepalive reply
    Pong = 0x0004,
    /// Graceful close
    Goodbye = 0x0005,

    /// Request pairing
    JoinQueue = 0x0010,
    /// Caller enqueued, no partner yet
    QueueWaiting = 0x0011,
    /// Pairing established
    Matched = 0x0012,
    /// Voluntarily end the current session
    Skip = 0x0013,
    /// The other participant left the session
    SessionEnded = 0x0014,

    /// SDP offer passthrough (payload opaque to the server)
    Offer = 0x0020,
    /// SDP answer passthrough (payload opaque to the server)
    Answer = 0x0021,
    /// ICE candidate passthrough (payload opaque to the server)
    Candidate = 0x0022,

    /// Session-scoped chat message (payload opaque to the server)
    Chat = 0x0030,

    /// Error report
    Error = 0x00FF,
}

impl Opcode {
    /// Raw u16 wire value.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a wire value. `None` if unrecognized.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Hello),
            0x0002 => Some(Self::HelloReply),
            0x0003 => Some(Self::Ping),
            0x0004 => Some(Self::Pong),
            0x0005 => Some(Self::Goodbye),
            0x0010 => Some(Self::JoinQueue),
            0x0011 => Some(Self::QueueWaiting),
            0x0012 => Some(Self::Matched),
            0x0013 => Some(Self::Skip),
            0x0014 => Some(Self::SessionEnded),
            0x0020 => Some(Self::Offer),
            0x0021 => Some(Self::Answer),
            0x0022 => Some(Self::Candidate),
            0x0030 => Some(Self::Chat),
            0x00FF => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether this opcode's payload is relayed verbatim between session
    /// participants without deserialization.
    #[must_use]
    pub const fn is_relay(self) -> bool {
        matches!(self, Self::Offer | Self::Answer | Self::Candidate | Self::Chat)
    }
}
