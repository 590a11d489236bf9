//! Typed frame bodies.
//!
//! A [`Payload`] is what sits behind a [`FrameHeader`]: a link message
//! (`session`), a membership request or event (`room`), or chat traffic
//! (`chat`). Bodies are CBOR; the variant is never encoded because the header
//! opcode already names it. Every variant has one opcode and every opcode one
//! variant, so `decode(p.opcode(), encode(p)) == p`.

pub mod chat;
pub mod room;
pub mod session;

use bytes::BufMut;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// A decoded frame body, tagged by its opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    // Session Management
    /// Initial handshake
    Hello(session::Hello),
    /// Handshake accepted, carries the session id
    HelloReply(session::HelloReply),
    /// Ping for keepalive
    Ping,
    /// Pong response
    Pong,
    /// Graceful disconnect
    Goodbye(session::Goodbye),
    /// Error response
    Error(ErrorPayload),

    // Room Membership
    /// Create a room
    CreateRoom(room::CreateRoom),
    /// Room created
    RoomCreated(room::RoomCreated),
    /// Join a room
    JoinRoom(room::JoinRoom),
    /// Join accepted
    RoomJoined(room::RoomJoined),
    /// Leave the room
    LeaveRoom(room::LeaveRoom),
    /// Resume after reconnect
    ResumeRoom(room::ResumeRoom),
    /// Resumed room state
    Resync(room::Resync),
    /// Room vanished
    RoomGone(room::RoomGone),
    /// Participant joined or left
    Presence(room::Presence),

    // Chat
    /// Post a message
    SendMessage(chat::SendMessage),
    /// Delivered message
    Message(chat::ChatMessage),
    /// Own typing state
    SetTyping(chat::SetTyping),
    /// Peer typing state
    TypingUpdate(chat::TypingUpdate),
}

/// Body of an `Error` frame.
///
/// Answers the request named by the frame's request id, or nothing when that
/// id is 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// One of the `ErrorPayload` code constants, or something newer
    pub code: u16,
    /// Text for a human
    pub message: String,
    /// Seconds to wait before retrying, if the backend says
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorPayload {
    /// The backend refused the frame outright.
    pub const FRAME_REJECTED: u16 = 0x0001;
    /// Room does not exist.
    pub const ROOM_NOT_FOUND: u16 = 0x0002;
    /// The body did not decode for its opcode.
    pub const INVALID_PAYLOAD: u16 = 0x0004;
    /// Sender is over its message rate.
    pub const RATE_LIMITED: u16 = 0x0008;
    /// Operation requires room membership.
    pub const NOT_IN_ROOM: u16 = 0x0009;

    /// `FRAME_REJECTED` with `reason`.
    pub fn frame_rejected(reason: impl Into<String>) -> Self {
        Self { message: reason.into(), code: Self::FRAME_REJECTED, retry_after: None }
    }

    /// `ROOM_NOT_FOUND` naming `room_id`.
    pub fn room_not_found(room_id: &str) -> Self {
        Self {
            code: Self::ROOM_NOT_FOUND,
            message: format!("room not found: {room_id}"),
            retry_after: None,
        }
    }

    /// `INVALID_PAYLOAD` with the decoder's complaint.
    pub fn invalid_payload(detail: impl Into<String>) -> Self {
        Self { code: Self::INVALID_PAYLOAD, message: detail.into(), retry_after: None }
    }

    /// `RATE_LIMITED`, retry after `retry_after` seconds.
    pub fn rate_limited(retry_after: u64) -> Self {
        Self {
            code: Self::RATE_LIMITED,
            message: "slow down".to_string(),
            retry_after: Some(retry_after),
        }
    }

    /// `NOT_IN_ROOM`.
    pub fn not_in_room() -> Self {
        Self { code: Self::NOT_IN_ROOM, message: "not in a room".to_string(), retry_after: None }
    }
}

fn cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}

fn write_cbor<T: Serialize>(body: &T, out: &mut impl std::io::Write) -> Result<()> {
    ciborium::ser::into_writer(body, out).map_err(|e| ProtocolError::CborEncode(e.to_string()))
}

impl Payload {
    /// The opcode a frame carrying this payload must have.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Hello(_) => Opcode::Hello,
            Self::HelloReply(_) => Opcode::HelloReply,
            Self::Ping => Opcode::Ping,
            Self::Pong => Opcode::Pong,
            Self::Goodbye(_) => Opcode::Goodbye,
            Self::Error(_) => Opcode::Error,
            Self::CreateRoom(_) => Opcode::CreateRoom,
            Self::RoomCreated(_) => Opcode::RoomCreated,
            Self::JoinRoom(_) => Opcode::JoinRoom,
            Self::RoomJoined(_) => Opcode::RoomJoined,
            Self::LeaveRoom(_) => Opcode::LeaveRoom,
            Self::ResumeRoom(_) => Opcode::ResumeRoom,
            Self::Resync(_) => Opcode::Resync,
            Self::RoomGone(_) => Opcode::RoomGone,
            Self::Presence(_) => Opcode::Presence,
            Self::SendMessage(_) => Opcode::SendMessage,
            Self::Message(_) => Opcode::Message,
            Self::SetTyping(_) => Opcode::SetTyping,
            Self::TypingUpdate(_) => Opcode::TypingUpdate,
        }
    }

    /// Append the CBOR body to `dst`.
    ///
    /// Only the inner struct is written. The size limit is left to
    /// [`Frame::encode`].
    ///
    /// # Errors
    ///
    /// `ProtocolError::CborEncode` if serde rejects the value.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut out = dst.writer();

        match self {
            Self::Hello(body) => write_cbor(body, &mut out),
            Self::HelloReply(body) => write_cbor(body, &mut out),
            Self::Ping | Self::Pong => Ok(()),
            Self::Goodbye(body) => write_cbor(body, &mut out),
            Self::Error(body) => write_cbor(body, &mut out),
            Self::CreateRoom(body) => write_cbor(body, &mut out),
            Self::RoomCreated(body) => write_cbor(body, &mut out),
            Self::JoinRoom(body) => write_cbor(body, &mut out),
            Self::RoomJoined(body) => write_cbor(body, &mut out),
            Self::LeaveRoom(body) => write_cbor(body, &mut out),
            Self::ResumeRoom(body) => write_cbor(body, &mut out),
            Self::Resync(body) => write_cbor(body, &mut out),
            Self::RoomGone(body) => write_cbor(body, &mut out),
            Self::Presence(body) => write_cbor(body, &mut out),
            Self::SendMessage(body) => write_cbor(body, &mut out),
            Self::Message(body) => write_cbor(body, &mut out),
            Self::SetTyping(body) => write_cbor(body, &mut out),
            Self::TypingUpdate(body) => write_cbor(body, &mut out),
        }
    }

    /// Read a body whose variant is given by `opcode`.
    ///
    /// Oversized input is refused before the CBOR parser sees it.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` above [`FrameHeader::MAX_PAYLOAD_SIZE`]
    /// - `ProtocolError::CborDecode` if the bytes are not that variant
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        let max = FrameHeader::MAX_PAYLOAD_SIZE as usize;
        if bytes.len() > max {
            return Err(ProtocolError::PayloadTooLarge { size: bytes.len(), max });
        }

        let payload = match opcode {
            Opcode::Hello => Self::Hello(cbor(bytes)?),
            Opcode::HelloReply => Self::HelloReply(cbor(bytes)?),
            Opcode::Ping => Self::Ping,
            Opcode::Pong => Self::Pong,
            Opcode::Goodbye => Self::Goodbye(cbor(bytes)?),
            Opcode::Error => Self::Error(cbor(bytes)?),
            Opcode::CreateRoom => Self::CreateRoom(cbor(bytes)?),
            Opcode::RoomCreated => Self::RoomCreated(cbor(bytes)?),
            Opcode::JoinRoom => Self::JoinRoom(cbor(bytes)?),
            Opcode::RoomJoined => Self::RoomJoined(cbor(bytes)?),
            Opcode::LeaveRoom => Self::LeaveRoom(cbor(bytes)?),
            Opcode::ResumeRoom => Self::ResumeRoom(cbor(bytes)?),
            Opcode::Resync => Self::Resync(cbor(bytes)?),
            Opcode::RoomGone => Self::RoomGone(cbor(bytes)?),
            Opcode::Presence => Self::Presence(cbor(bytes)?),
            Opcode::SendMessage => Self::SendMessage(cbor(bytes)?),
            Opcode::Message => Self::Message(cbor(bytes)?),
            Opcode::SetTyping => Self::SetTyping(cbor(bytes)?),
            Opcode::TypingUpdate => Self::TypingUpdate(cbor(bytes)?),
        };

        Ok(payload)
    }

    /// Wrap the encoded body in a frame under `header`.
    ///
    /// The opcode and size fields are overwritten; the request id is kept.
    ///
    /// # Errors
    ///
    /// `ProtocolError::CborEncode` if serde rejects the value.
    pub fn into_frame(self, mut header: FrameHeader) -> Result<Frame> {
        let mut body = Vec::new();
        self.encode(&mut body)?;
        header.opcode = self.opcode().to_u16().to_be_bytes();
        Ok(Frame::new(header, body))
    }

    /// Frame this payload as a request the backend answers under
    /// `request_id`.
    ///
    /// # Errors
    ///
    /// `ProtocolError::CborEncode` if serde rejects the value.
    pub fn into_request(self, request_id: u32) -> Result<Frame> {
        let header = FrameHeader::with_request(self.opcode(), request_id);
        self.into_frame(header)
    }

    /// Decode the body of `frame` according to its header opcode.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownOpcode` for opcodes this crate does not know
    /// - `ProtocolError::CborDecode` if the body is not the opcode's variant
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_request_keeps_request_id_and_opcode() {
        let payload = Payload::JoinRoom(room::JoinRoom {
            room_id: "abc".to_string(),
            nickname: "ana".to_string(),
            icon: "🦊".to_string(),
        });

        let frame = payload.clone().into_request(77).expect("encode");

        assert_eq!(frame.request_id(), 77);
        assert_eq!(frame.opcode(), Some(Opcode::JoinRoom));
        assert_eq!(Payload::from_frame(&frame).expect("decode"), payload);
    }

    #[test]
    fn ping_has_empty_payload() {
        let frame = Payload::Ping.into_frame(FrameHeader::new(Opcode::Ping)).expect("encode");
        assert!(frame.payload.is_empty());
        assert_eq!(Payload::from_frame(&frame).expect("decode"), Payload::Ping);
    }

    #[test]
    fn mismatched_payload_is_rejected() {
        let frame = Payload::SetTyping(chat::SetTyping { is_typing: true })
            .into_frame(FrameHeader::new(Opcode::SetTyping))
            .expect("encode");

        assert!(matches!(
            Payload::decode(Opcode::RoomCreated, &frame.payload),
            Err(ProtocolError::CborDecode(_))
        ));
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let mut bytes = FrameHeader::new(Opcode::Ping).to_bytes();
        bytes[6..8].copy_from_slice(&0x0999u16.to_be_bytes());
        let frame = Frame::decode(&bytes).expect("header is structurally valid");

        assert_eq!(Payload::from_frame(&frame), Err(ProtocolError::UnknownOpcode(0x0999)));
    }

    #[test]
    fn optional_message_fields_may_be_omitted() {
        let record = chat::MessageRecord {
            perm_id: "p1".to_string(),
            timestamp: 5,
            user_nickname: None,
            user_icon: None,
            body: "room created".to_string(),
            is_system: true,
        };
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&record, &mut buf).expect("encode");

        let decoded: chat::MessageRecord = cbor(&buf).expect("decode");
        assert_eq!(decoded, record);
    }
}
