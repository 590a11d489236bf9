//! Fuzz target for Payload::from_frame
//!
//! Feeds arbitrary CBOR under every opcode:
//! - malformed CBOR
//! - a payload shaped for a different opcode
//! - oversized strings and collections
//!
//! Decoding must return an error rather than panic.

#![no_main]

use bytes::Bytes;
use huddle_proto::{Frame, FrameHeader, Opcode, Payload};
use libfuzzer_sys::fuzz_target;

const OPCODES: [Opcode; 19] = [
    Opcode::Hello,
    Opcode::HelloReply,
    Opcode::Ping,
    Opcode::Pong,
    Opcode::Goodbye,
    Opcode::Error,
    Opcode::CreateRoom,
    Opcode::RoomCreated,
    Opcode::JoinRoom,
    Opcode::RoomJoined,
    Opcode::LeaveRoom,
    Opcode::ResumeRoom,
    Opcode::Resync,
    Opcode::RoomGone,
    Opcode::Presence,
    Opcode::SendMessage,
    Opcode::Message,
    Opcode::SetTyping,
    Opcode::TypingUpdate,
];

fuzz_target!(|data: &[u8]| {
    for opcode in OPCODES {
        let frame = Frame::new(FrameHeader::new(opcode), Bytes::copy_from_slice(data));

        if let Ok(payload) = Payload::from_frame(&frame) {
            assert_eq!(payload.opcode(), opcode);
        }
    }
});
