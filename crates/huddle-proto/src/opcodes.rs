//! Operation codes.
//!
//! Opcodes are grouped by range: `0x00xx` session management, `0x01xx` room
//! membership, `0x02xx` chat traffic. The range is visible in the high byte so
//! a packet capture reads at a glance.

/// Frame operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Client handshake.
    Hello = 0x0001,
    /// Server handshake response.
    HelloReply = 0x0002,
    /// Keepalive probe.
    Ping = 0x0003,
    /// Keepalive response.
    Pong = 0x0004,
    /// Graceful disconnect.
    Goodbye = 0x0005,
    /// Error response, correlated by request id.
    Error = 0x000F,

    /// Create a new room.
    CreateRoom = 0x0100,
    /// Room created, caller is its first participant.
    RoomCreated = 0x0101,
    /// Join an existing room.
    JoinRoom = 0x0102,
    /// Join accepted.
    RoomJoined = 0x0103,
    /// Leave the current room (best effort, never answered).
    LeaveRoom = 0x0104,
    /// Re-attach to a room after reconnecting.
    ResumeRoom = 0x0105,
    /// Room state for a resumed membership.
    Resync = 0x0106,
    /// Room no longer exists.
    RoomGone = 0x0107,
    /// Participant joined or left.
    Presence = 0x0108,

    /// Post a chat message.
    SendMessage = 0x0200,
    /// Chat message delivered by the backend.
    Message = 0x0201,
    /// Update own typing state.
    SetTyping = 0x0202,
    /// Another participant's typing state changed.
    TypingUpdate = 0x0203,
}

impl Opcode {
    /// Raw wire value.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a wire value. `None` if unrecognized.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            0x0001 => Self::Hello,
            0x0002 => Self::HelloReply,
            0x0003 => Self::Ping,
            0x0004 => Self::Pong,
            0x0005 => Self::Goodbye,
            0x000F => Self::Error,
            0x0100 => Self::CreateRoom,
            0x0101 => Self::RoomCreated,
            0x0102 => Self::JoinRoom,
            0x0103 => Self::RoomJoined,
            0x0104 => Self::LeaveRoom,
            0x0105 => Self::ResumeRoom,
            0x0106 => Self::Resync,
            0x0107 => Self::RoomGone,
            0x0108 => Self::Presence,
            0x0200 => Self::SendMessage,
            0x0201 => Self::Message,
            0x0202 => Self::SetTyping,
            0x0203 => Self::TypingUpdate,
            _ => return None,
        })
    }

    /// Session-management opcodes are consumed by the link layer, everything
    /// else belongs to the room session.
    #[must_use]
    pub const fn is_link(self) -> bool {
        matches!(self, Self::Hello | Self::HelloReply | Self::Ping | Self::Pong | Self::Goodbye)
    }
}
