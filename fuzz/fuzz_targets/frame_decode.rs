//! Fuzz target for Frame::decode
//!
//! Arbitrary bytes must never panic the decoder. Whatever decodes must
//! re-encode to the exact bytes it was read from.

#![no_main]

use huddle_proto::{Frame, FrameHeader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = Frame::decode(data) else {
        return;
    };

    let consumed = FrameHeader::SIZE + frame.payload.len();
    assert!(consumed <= data.len());
    assert!(frame.payload.len() <= FrameHeader::MAX_PAYLOAD_SIZE as usize);

    let mut encoded = Vec::with_capacity(consumed);
    frame.encode(&mut encoded).expect("decoded frame re-encodes");
    assert_eq!(&encoded[..], &data[..consumed]);
});
