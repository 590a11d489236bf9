//! Chat traffic payloads: messages and typing signals.

use serde::{Deserialize, Serialize};

/// A message as delivered by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Stable identity, used for de-duplication.
    pub perm_id: String,
    /// Backend time (ms since epoch).
    pub timestamp: u64,
    /// Author's display name. Absent for system notices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_nickname: Option<String>,
    /// Author's avatar glyph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_icon: Option<String>,
    /// Message text.
    pub body: String,
    /// Synthetic join/leave/system notice rather than user content.
    #[serde(default)]
    pub is_system: bool,
}

/// Post a message to the current room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    /// Trimmed message text.
    pub body: String,
}

/// Message delivered to every participant, sender included (the echo).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Room the message belongs to.
    pub room_id: String,
    /// The message.
    pub record: MessageRecord,
}

/// Update own typing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetTyping {
    /// Whether the caller is typing.
    pub is_typing: bool,
}

/// Another participant's typing state changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingUpdate {
    /// Room the signal belongs to.
    pub room_id: String,
    /// Participant whose state changed.
    pub participant_id: u64,
    /// New typing state.
    pub is_typing: bool,
}
