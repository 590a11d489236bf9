//! A header plus its still-encoded payload.
//!
//! Frames are what the transport moves. Typed access to the payload goes
//! through [`crate::Payload::from_frame`] and [`crate::Payload::into_frame`].

use bytes::{BufMut, Bytes};

use crate::{
    FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// One protocol frame: `[16-byte header][payload]`.
///
/// `payload.len()` always equals `header.payload_size()`: [`Frame::new`]
/// stamps the size and [`Frame::decode`] reads exactly that many bytes.
/// Payloads above [`FrameHeader::MAX_PAYLOAD_SIZE`] never make it onto or
/// off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Routing and correlation header
    pub header: FrameHeader,

    /// CBOR payload bytes
    pub payload: Bytes,
}

impl Frame {
    /// Wrap `payload`, recording its length in the header.
    ///
    /// The size limit is checked by [`Frame::encode`], not here.
    #[must_use]
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();

        // Every producer stays far below the 64 KiB limit
        #[allow(clippy::expect_used)]
        let payload_len =
            u32::try_from(payload.len()).expect("invariant: payload length fits in u32");
        header.payload_size = payload_len.to_be_bytes();

        Self { header, payload }
    }

    /// Frame with an empty payload (Ping, Pong).
    #[must_use]
    pub fn empty(opcode: Opcode) -> Self {
        Self::new(FrameHeader::new(opcode), Bytes::new())
    }

    /// Opcode as enum. `None` if unrecognized.
    #[must_use]
    pub fn opcode(&self) -> Option<Opcode> {
        self.header.opcode_enum()
    }

    /// Request id carried in the header.
    #[must_use]
    pub fn request_id(&self) -> u32 {
        self.header.request_id()
    }

    /// Append the wire bytes to `dst`.
    ///
    /// Nothing is written on error.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` above [`FrameHeader::MAX_PAYLOAD_SIZE`]
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

    /// Read one frame from the front of `bytes`.
    ///
    /// The payload is copied but not parsed. Bytes past the announced
    /// payload are ignored.
    ///
    /// # Errors
    ///
    /// - Any header error from [`FrameHeader::from_bytes`]
    /// - `ProtocolError::FrameTruncated` if the payload is cut short
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(bytes)?;

        let expected = header.payload_size() as usize;
        let body = &bytes[FrameHeader::SIZE..];

        let Some(payload) = body.get(..expected) else {
            return Err(ProtocolError::FrameTruncated { expected, actual: body.len() });
        };

        Ok(Self { header: *header, payload: Bytes::copy_from_slice(payload) })
    }
}
