//! Wire format for the Huddle chat protocol.
//!
//! Frames consist of a fixed 16-byte header (zero-copy binary) followed by a
//! variable-length CBOR payload. The header carries the opcode and the request
//! id used to correlate responses with the intent that caused them, so a
//! client can route a frame without deserializing its payload.
//!
//! # Security
//!
//! All parsing uses compile-time verified layouts via `zerocopy`. Payloads are
//! capped at 64 KiB; chat traffic never needs more and the cap bounds the
//! memory a hostile peer can make us allocate.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
pub mod frame;
pub mod header;
pub mod opcodes;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use opcodes::Opcode;
pub use payloads::{ErrorPayload, Payload};
