//! The fixed-size frame header.
//!
//! Every frame starts with 16 big-endian bytes that the client can route on
//! (opcode) and correlate on (request id) before touching the CBOR payload.
//! The header is read in place from the receive buffer with zerocopy.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    Opcode,
    errors::{ProtocolError, Result},
};

/// Wire header preceding every payload.
///
/// | Bytes  | Field                               |
/// |--------|-------------------------------------|
/// | 0..4   | magic `HDLE`                        |
/// | 4      | version                             |
/// | 5      | flags, reserved                     |
/// | 6..8   | opcode                              |
/// | 8..12  | request id, 0 when uncorrelated     |
/// | 12..16 | payload size                        |
///
/// Multi-byte fields are kept as byte arrays so the struct has alignment 1
/// and any 16 bytes can be viewed as a header. Only
/// [`FrameHeader::from_bytes`] decides whether those bytes make sense.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    magic: [u8; 4],
    version: u8,
    flags: u8,
    pub(crate) opcode: [u8; 2],
    request_id: [u8; 4],
    pub(crate) payload_size: [u8; 4],
}

impl FrameHeader {
    /// Encoded length.
    pub const SIZE: usize = 16;

    /// `b"HDLE"` read as a big-endian `u32`.
    pub const MAGIC: u32 = 0x4844_4C45;

    /// The only version this crate speaks.
    pub const VERSION: u8 = 0x01;

    /// Largest payload a header may announce.
    pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024;

    /// Uncorrelated header for `opcode` with an empty payload.
    #[must_use]
    pub fn new(opcode: Opcode) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            flags: 0,
            opcode: opcode.to_u16().to_be_bytes(),
            request_id: [0; 4],
            payload_size: [0; 4],
        }
    }

    /// Header for `opcode` that the backend will answer under `request_id`.
    #[must_use]
    pub fn with_request(opcode: Opcode, request_id: u32) -> Self {
        Self { request_id: request_id.to_be_bytes(), ..Self::new(opcode) }
    }

    /// View the first [`Self::SIZE`] bytes of `bytes` as a header.
    ///
    /// Trailing bytes are left for the caller.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` for fewer than 16 bytes
    /// - `ProtocolError::InvalidMagic` unless the buffer starts with `HDLE`
    /// - `ProtocolError::UnsupportedVersion` for any version but 1
    /// - `ProtocolError::PayloadTooLarge` if the announced size exceeds
    ///   [`Self::MAX_PAYLOAD_SIZE`]
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let (header, _rest) = Self::ref_from_prefix(bytes).map_err(|_| {
            ProtocolError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() }
        })?;
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<()> {
        if self.magic() != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }
        if self.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(self.version));
        }

        let size = self.payload_size();
        if size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }
        Ok(())
    }

    /// The 16 wire bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Magic number as read.
    #[must_use]
    pub fn magic(&self) -> u32 {
        u32::from_be_bytes(self.magic)
    }

    /// Version byte as read.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Raw opcode, including values this crate does not know.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.opcode)
    }

    /// Known opcode, if any.
    #[must_use]
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u16(self.opcode())
    }

    /// Correlation id, 0 when the frame answers nothing.
    #[must_use]
    pub fn request_id(&self) -> u32 {
        u32::from_be_bytes(self.request_id)
    }

    /// Announced payload length.
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }

    /// Overwrite the correlation id.
    pub fn set_request_id(&mut self, request_id: u32) {
        self.request_id = request_id.to_be_bytes();
    }
}

// Packed fields cannot be borrowed, so Debug and PartialEq go through the
// accessors and the byte image.
impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("FrameHeader");
        match self.opcode_enum() {
            Some(opcode) => out.field("opcode", &opcode),
            None => out.field("opcode", &format_args!("{:#06x}", self.opcode())),
        };
        out.field("request_id", &self.request_id())
            .field("payload_size", &self.payload_size())
            .finish_non_exhaustive()
    }
}

impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for FrameHeader {}
