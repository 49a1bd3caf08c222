//! Frame header with zero-copy parsing.
//!
//! The header is a fixed 48-byte raw binary structure (Big Endian) holding
//! everything the server needs to route a frame: opcode, sender, target, and
//! session id. Relayed payloads stay opaque because routing never has to look
//! past the header.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    Opcode,
    errors::{ProtocolError, Result},
};

/// Fixed 48-byte frame header (Big Endian network byte order).
///
/// Multi-byte integers are stored as raw big-endian byte arrays to avoid
/// alignment issues with the packed layout.
///
/// # Security
///
/// The `#[repr(C, packed)]` layout with zerocopy traits lets the header be
/// cast directly from untrusted network bytes: every 48-byte bit pattern is a
/// structurally valid header, so the cast itself can never produce undefined
/// behavior. Semantic validation (magic, version, payload size) happens in
/// [`FrameHeader::from_bytes`].
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    // Protocol identification (8 bytes: 0-7)
    magic: [u8; 4],             // 0x504C4E4B ("PLNK" in ASCII)
    version: u8,                // 0x01
    reserved: u8,               // must be zero
    pub(crate) opcode: [u8; 2], // u16 operation code

    // Payload metadata (4 bytes: 8-11)
    pub(crate) payload_size: [u8; 4], // u32 payload length

    // Routing context (32 bytes: 12-43)
    sender_id: [u8; 8],   // u64 originating peer (stamped by the server)
    target_id: [u8; 8],   // u64 relay target (`to` on inbound frames)
    session_id: [u8; 16], // u128 pairing session id

    // Padding to 48 bytes (4 bytes: 44-47)
    reserved2: [u8; 4],
}

impl FrameHeader {
    /// Size of the serialized header in bytes.
    pub const SIZE: usize = 48;

    /// Magic number: "PLNK" in ASCII.
    pub const MAGIC: u32 = 0x504C_4E4B;

    /// Current protocol version.
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (64 KiB). Signaling and chat payloads are small;
    /// anything larger indicates a misbehaving client.
    pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024;

    /// Create a new header with the specified opcode and all routing fields
    /// zeroed.
    #[must_use]
    pub fn new(opcode: Opcode) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            reserved: 0,
            opcode: opcode.to_u16().to_be_bytes(),
            payload_size: [0; 4],
            sender_id: [0; 8],
            target_id: [0; 8],
            session_id: [0; 16],
            reserved2: [0; 4],
        }
    }

    /// Parse a header from network bytes (zero-copy, safe).
    ///
    /// Validates cheapest properties first (length, magic) before version and
    /// payload size, failing fast on garbage data.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::FrameTooShort`] if fewer than 48 bytes
    /// - [`ProtocolError::InvalidMagic`] on magic mismatch
    /// - [`ProtocolError::UnsupportedVersion`] on version mismatch
    /// - [`ProtocolError::PayloadTooLarge`] if the claimed payload size
    ///   exceeds [`Self::MAX_PAYLOAD_SIZE`]
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        if u32::from_be_bytes(header.magic) != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        let payload_size = u32::from_be_bytes(header.payload_size);
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize the header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Operation code as raw u16.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.opcode)
    }

    /// Operation code as enum. `None` if unrecognized.
    #[must_use]
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u16(self.opcode())
    }

    /// Originating peer id. Zero on client-sent frames; the server stamps
    /// this before forwarding.
    #[must_use]
    pub fn sender_id(&self) -> u64 {
        u64::from_be_bytes(self.sender_id)
    }

    /// Relay target peer id (`to` on inbound relay frames).
    #[must_use]
    pub fn target_id(&self) -> u64 {
        u64::from_be_bytes(self.target_id)
    }

    /// Pairing session id this frame refers to. Zero when not applicable.
    #[must_use]
    pub fn session_id(&self) -> u128 {
        u128::from_be_bytes(self.session_id)
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }

    /// Update the originating peer id.
    pub fn set_sender_id(&mut self, sender_id: u64) {
        self.sender_id = sender_id.to_be_bytes();
    }

    /// Update the relay target peer id.
    pub fn set_target_id(&mut self, target_id: u64) {
        self.target_id = target_id.to_be_bytes();
    }

    /// Update the session id.
    pub fn set_session_id(&mut self, session_id: u128) {
        self.session_id = session_id.to_be_bytes();
    }

    /// Update the payload size.
    pub fn set_payload_size(&mut self, size: u32) {
        self.payload_size = size.to_be_bytes();
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("version", &self.version)
            .field("opcode", &format!("{:#06x}", self.opcode()))
            .field("sender_id", &self.sender_id())
            .field("target_id", &self.target_id())
            .field("session_id", &format!("{:#034x}", self.session_id()))
            .field("payload_size", &self.payload_size())
            .finish_non_exhaustive()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FrameHeader {}
