//! Room membership payloads.
//!
//! Create, join and resume are request/response pairs correlated by the
//! header request id. Leave is fire-and-forget. `Presence` and `RoomGone` are
//! unsolicited.

use serde::{Deserialize, Serialize};

use super::chat::MessageRecord;

/// Most messages a [`Resync`] carries. Older ones are not replayed.
pub const RESYNC_PAGE: usize = 25;

/// A participant as seen by the other members of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Backend-assigned identifier, unique within the room.
    pub id: u64,
    /// Display name.
    pub nickname: String,
    /// Avatar glyph.
    pub icon: String,
}

/// Create a new room with the caller as first participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRoom {
    /// Caller's display name.
    pub nickname: String,
    /// Caller's avatar glyph.
    pub icon: String,
}

/// Room created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCreated {
    /// Identifier to share with other participants.
    pub room_id: String,
    /// Caller's participant id in the new room.
    pub participant_id: u64,
    /// Backend time of creation (ms since epoch).
    pub timestamp: u64,
}

/// Join an existing room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoom {
    /// Room to join.
    pub room_id: String,
    /// Caller's display name.
    pub nickname: String,
    /// Caller's avatar glyph.
    pub icon: String,
}

/// Join accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomJoined {
    /// Joined room.
    pub room_id: String,
    /// Caller's participant id.
    pub participant_id: u64,
    /// Backend time of the join (ms since epoch).
    pub timestamp: u64,
    /// Everyone currently in the room, caller included.
    #[serde(default)]
    pub participants: Vec<Participant>,
}

/// Leave the current room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRoom {
    /// Room being left.
    pub room_id: String,
}

/// Re-attach to a room after the transport was re-established.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeRoom {
    /// Room to resume.
    pub room_id: String,
    /// Display name to resume with.
    pub nickname: String,
    /// Avatar glyph to resume with.
    pub icon: String,
    /// `perm_id` of the newest message the caller already holds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
}

/// Room state delivered in answer to [`ResumeRoom`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resync {
    /// Resumed room.
    pub room_id: String,
    /// Caller's (possibly new) participant id.
    pub participant_id: u64,
    /// Everyone currently in the room.
    #[serde(default)]
    pub participants: Vec<Participant>,
    /// Messages after the resume cursor in delivery order, at most
    /// [`RESYNC_PAGE`] and never more than fit in one frame.
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
}

/// Room no longer exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomGone {
    /// Room that vanished.
    pub room_id: String,
    /// Human-readable reason.
    pub reason: String,
}

/// Whether a presence event announces an arrival or a departure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenceKind {
    /// Participant joined.
    Joined,
    /// Participant left.
    Left,
}

/// Participant joined or left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    /// Room the event belongs to.
    pub room_id: String,
    /// Stable id of the resulting system message.
    pub perm_id: String,
    /// Backend time of the event (ms since epoch).
    pub timestamp: u64,
    /// Who joined or left.
    pub participant: Participant,
    /// Arrival or departure.
    pub kind: PresenceKind,
}
