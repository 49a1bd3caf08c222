//! Frame type combining header and raw payload bytes.
//!
//! A `Frame` is the transport-layer packet: a 48-byte raw binary header
//! followed by a variable-length payload. It holds raw bytes, NOT the
//! [`crate::Payload`] enum, so the server can route relay frames without
//! deserializing them.

use bytes::{BufMut, Bytes};

use crate::{
    FrameHeader,
    errors::{ProtocolError, Result},
};

/// Complete protocol frame.
///
/// Wire layout: `[FrameHeader: 48 bytes] + [payload: variable bytes]`
///
/// # Invariants
///
/// - Size Consistency: `payload.len()` MUST match `header.payload_size()`.
///   Enforced by [`Frame::new`] and verified by [`Frame::decode`].
/// - Size Limit: `payload.len()` MUST NOT exceed
///   [`FrameHeader::MAX_PAYLOAD_SIZE`]. Violations are rejected during
///   decoding and encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header (48 bytes)
    pub header: FrameHeader,

    /// Raw payload bytes (already CBOR-encoded, or opaque relay content)
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame, setting the header's `payload_size` to match the
    /// actual payload length.
    #[must_use]
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();

        // INVARIANT: Bytes is bounded by isize::MAX and the protocol limit is
        // 64 KiB, so the length always fits in u32.
        #[allow(clippy::expect_used)]
        let payload_len =
            u32::try_from(payload.len()).expect("invariant: payload length fits in u32");

        header.payload_size = payload_len.to_be_bytes();

        debug_assert_eq!(header.payload_size(), payload_len);

        Self { header, payload }
    }

    /// Encode frame into a buffer.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::PayloadTooLarge`] if payload exceeds
    ///   [`FrameHeader::MAX_PAYLOAD_SIZE`]
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        debug_assert_eq!(self.payload.len(), self.header.payload_size() as usize);

        if self.payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode frame from wire format.
    ///
    /// Returns a frame with raw payload bytes; it does NOT deserialize CBOR.
    /// All header validation happens before any payload memory is copied, and
    /// exactly `payload_size` bytes are read so trailing data is ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError` if header parsing fails (short, bad magic/version,
    ///   oversized payload claim)
    /// - [`ProtocolError::FrameTruncated`] if fewer payload bytes are present
    ///   than the header claims
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(bytes)?;

        let payload_size = header.payload_size() as usize;
        let total_size = FrameHeader::SIZE.checked_add(payload_size).ok_or({
            ProtocolError::PayloadTooLarge {
                size: payload_size,
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            }
        })?;

        if bytes.len() < total_size {
            return Err(ProtocolError::FrameTruncated {
                expected: payload_size,
                actual: bytes.len().saturating_sub(FrameHeader::SIZE),
            });
        }

        // INVARIANT: bytes.len() >= total_size was checked above, so the
        // slice cannot be out of bounds.
        #[allow(clippy::expect_used)]
        let payload = Bytes::copy_from_slice(
            bytes.get(FrameHeader::SIZE..total_size).expect("invariant: bounds checked above"),
        );

        debug_assert_eq!(payload.len(), payload_size);

        Ok(Self { header: *header, payload })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::Opcode;

    impl Arbitrary for Frame {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with((): Self::Parameters) -> Self::Strategy {
            (any::<FrameHeader>(), prop::collection::vec(any::<u8>(), 0..512))
                .prop_map(|(header, payload_bytes)| Self::new(header, payload_bytes))
                .boxed()
        }
    }

    proptest! {
        #[test]
        fn frame_round_trip(frame in any::<Frame>()) {
            let mut wire = Vec::new();
            frame.encode(&mut wire).expect("should encode");

            let parsed = Frame::decode(&wire).expect("should decode");
            prop_assert_eq!(&frame.header, &parsed.header);
            prop_assert_eq!(frame.payload, parsed.payload);
        }
    }

    #[test]
    fn frame_with_payload() {
        let header = FrameHeader::new(Opcode::Chat);

        let payload_bytes = vec![1, 2, 3, 4];
        let frame = Frame::new(header, payload_bytes.clone());
        assert_eq!(frame.header.payload_size(), 4);

        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");

        let parsed = Frame::decode(&wire).expect("should decode");
        assert_eq!(frame.payload, parsed.payload);
    }

    #[test]
    fn trailing_bytes_ignored() {
        let frame = Frame::new(FrameHeader::new(Opcode::Ping), Vec::new());

        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");
        wire.extend_from_slice(&[0xDE, 0xAD]);

        let parsed = Frame::decode(&wire).expect("should decode");
        assert!(parsed.payload.is_empty());
    }

    #[test]
    fn reject_truncated_frame() {
        // Header claims 100 payload bytes but only the header is provided
        let mut header = FrameHeader::new(Opcode::Offer);
        header.set_payload_size(100);

        let result = Frame::decode(&header.to_bytes());
        assert!(matches!(result, Err(ProtocolError::FrameTruncated { .. })));
    }
}
