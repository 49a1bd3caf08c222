//! CBOR-encoded protocol messages.
//!
//! Frame headers are raw binary for routing; structured payloads use CBOR for
//! forward compatibility. The server deserializes only link-management and
//! matchmaking payloads. Signaling and chat payloads are typed here for
//! clients, but the server relays their bytes verbatim.
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one opcode (enforced by match
//! exhaustiveness). The variant discriminator is NOT serialized: the frame
//! header's opcode already identifies the payload type, which prevents
//! mismatched opcode/payload pairs on the wire.

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::{
    Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// All possible frame payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    // Link management
    /// Client handshake open
    Hello(Hello),
    /// Server handshake reply with the assigned peer id
    HelloReply(HelloReply),
    /// Keepalive probe
    Ping,
    /// Keepalive reply
    Pong,
    /// Graceful disconnect
    Goodbye(Goodbye),

    // Matchmaking
    /// Request pairing with a waiting peer
    JoinQueue,
    /// No partner available yet, caller is enqueued
    QueueWaiting,
    /// Pairing established
    Matched(Matched),
    /// Voluntarily end the current session
    Skip,
    /// The other participant left the session
    SessionEnded(SessionEnded),

    // Signaling relay (opaque to the server)
    /// SDP offer
    Offer(Sdp),
    /// SDP answer
    Answer(Sdp),
    /// Trickle ICE candidate
    Candidate(IceCandidate),

    // Chat relay (opaque to the server)
    /// Session-scoped text message
    Chat(ChatMessage),

    /// Error response
    Error(ErrorPayload),
}

/// Client handshake payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Highest protocol version the client speaks.
    pub version: u8,
}

/// Server handshake reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReply {
    /// Server-assigned peer id, valid for the lifetime of the connection.
    pub peer_id: u64,
}

/// Graceful disconnect notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goodbye {
    /// Free-form reason, for logging only.
    pub reason: String,
}

/// Pairing notification sent to both session participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matched {
    /// Session identifier, echoed in relay frame headers.
    pub session_id: u128,

    /// Both participant peer ids.
    pub participants: [u64; 2],

    /// The participant that creates the SDP offer. Always the peer that was
    /// already waiting when the match formed.
    pub initiator_id: u64,
}

/// Why a session ended, from the surviving participant's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// The partner skipped to find a new match.
    Skip,
    /// The partner's connection closed.
    Disconnect,
}

/// Session teardown notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEnded {
    /// The session that ended.
    pub session_id: u128,
    /// Why it ended.
    pub reason: EndReason,
}

/// SDP offer or answer body. The server never inspects this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sdp {
    /// Session description in SDP format.
    pub sdp: String,
}

/// Trickle ICE candidate. The server never inspects this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate line as produced by the ICE agent.
    pub candidate: String,
}

/// Chat message body. The server never inspects this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message text.
    pub text: String,
}

/// Error payload for error frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code identifying the type of error.
    pub code: u16,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorPayload {
    /// Relay or skip attempted without an active session.
    pub const NOT_IN_SESSION: u16 = 0x0001;
    /// Relay target is not the sender's session partner.
    pub const UNKNOWN_TARGET: u16 = 0x0002;
    /// Payload could not be decoded.
    pub const INVALID_PAYLOAD: u16 = 0x0003;
    /// Frame arrived before the handshake completed.
    pub const NOT_READY: u16 = 0x0004;

    /// Create a not-in-session error.
    pub fn not_in_session() -> Self {
        Self { code: Self::NOT_IN_SESSION, message: "no active session".to_string() }
    }

    /// Create an unknown-target error.
    pub fn unknown_target(target_id: u64) -> Self {
        Self {
            code: Self::UNKNOWN_TARGET,
            message: format!("target {target_id} is not the session partner"),
        }
    }

    /// Create an invalid payload error.
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self { code: Self::INVALID_PAYLOAD, message: msg.into() }
    }

    /// Create a not-ready error.
    pub fn not_ready() -> Self {
        Self { code: Self::NOT_READY, message: "handshake not complete".to_string() }
    }
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Hello(_) => Opcode::Hello,
            Self::HelloReply(_) => Opcode::HelloReply,
            Self::Ping => Opcode::Ping,
            Self::Pong => Opcode::Pong,
            Self::Goodbye(_) => Opcode::Goodbye,
            Self::JoinQueue => Opcode::JoinQueue,
            Self::QueueWaiting => Opcode::QueueWaiting,
            Self::Matched(_) => Opcode::Matched,
            Self::Skip => Opcode::Skip,
            Self::SessionEnded(_) => Opcode::SessionEnded,
            Self::Offer(_) => Opcode::Offer,
            Self::Answer(_) => Opcode::Answer,
            Self::Candidate(_) => Opcode::Candidate,
            Self::Chat(_) => Opcode::Chat,
            Self::Error(_) => Opcode::Error,
        }
    }

    /// Encode payload to a buffer.
    ///
    /// Serializes only the inner struct, NOT the variant tag. Unit variants
    /// encode as zero bytes.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::CborEncode`] if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::Hello(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::HelloReply(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Goodbye(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Matched(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::SessionEnded(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Offer(inner) | Self::Answer(inner) => {
                ciborium::ser::into_writer(inner, &mut writer)
            },
            Self::Candidate(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Chat(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Error(inner) => ciborium::ser::into_writer(inner, &mut writer),
            // Zero-byte payloads
            Self::Ping | Self::Pong | Self::JoinQueue | Self::QueueWaiting | Self::Skip => Ok(()),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode payload from bytes based on opcode.
    ///
    /// The size check happens BEFORE CBOR parsing begins, so the parser never
    /// processes oversized inputs.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::PayloadTooLarge`] if bytes exceed the size limit
    /// - [`ProtocolError::CborDecode`] if CBOR deserialization fails
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        fn de<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
            ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
        }

        let payload = match opcode {
            Opcode::Hello => Self::Hello(de(bytes)?),
            Opcode::HelloReply => Self::HelloReply(de(bytes)?),
            Opcode::Ping => Self::Ping,
            Opcode::Pong => Self::Pong,
            Opcode::Goodbye => Self::Goodbye(de(bytes)?),
            Opcode::JoinQueue => Self::JoinQueue,
            Opcode::QueueWaiting => Self::QueueWaiting,
            Opcode::Matched => Self::Matched(de(bytes)?),
            Opcode::Skip => Self::Skip,
            Opcode::SessionEnded => Self::SessionEnded(de(bytes)?),
            Opcode::Offer => Self::Offer(de(bytes)?),
            Opcode::Answer => Self::Answer(de(bytes)?),
            Opcode::Candidate => Self::Candidate(de(bytes)?),
            Opcode::Chat => Self::Chat(de(bytes)?),
            Opcode::Error => Self::Error(de(bytes)?),
        };

        Ok(payload)
    }

    /// Convert payload into a transport frame.
    ///
    /// Encodes the payload to CBOR, stamps the matching opcode into the
    /// header, and builds a frame with the payload size set automatically.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::CborEncode`] if serialization fails
    pub fn into_frame(self, mut header: FrameHeader) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        header.opcode = self.opcode().to_u16().to_be_bytes();
        Ok(Frame::new(header, buf))
    }

    /// Parse payload from a raw transport frame.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::UnknownOpcode`] if the header opcode is unrecognized
    /// - [`ProtocolError::CborDecode`] if deserialization fails
    /// - [`ProtocolError::PayloadTooLarge`] if payload exceeds the size limit
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}
