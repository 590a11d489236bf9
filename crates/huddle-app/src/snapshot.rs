//! Read-only projection published to the presentation layer.

use huddle_client::{ConnectionState, Identity, Message, Session, SessionPhase};
use huddle_proto::payloads::room::Participant;

/// Everything a frontend needs to render the session.
///
/// Recomputed after every accepted transition and published through a
/// `tokio::sync::watch` channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    /// Link state
    pub connection: ConnectionState,
    /// Session phase
    pub phase: SessionPhase,
    /// Current room, present iff `identity` is present
    pub room_id: Option<String>,
    /// Identity in the current room
    pub identity: Option<Identity>,
    /// Identity remembered from a previous launch, for prefilling forms
    pub remembered: Option<Identity>,
    /// Message log in display order
    pub messages: Vec<Message>,
    /// Room participants in id order
    pub roster: Vec<Participant>,
    /// Whether someone else is typing
    pub anyone_typing: bool,
    /// Latest notice worth showing (a rejection, a lost room, a failed
    /// reconnect)
    pub status: Option<String>,
    /// Session revision this snapshot was taken at
    pub revision: u64,
}

impl RoomSnapshot {
    /// Snapshot of a runtime that has not started yet.
    pub fn initial() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            phase: SessionPhase::Idle,
            room_id: None,
            identity: None,
            remembered: None,
            messages: Vec::new(),
            roster: Vec::new(),
            anyone_typing: false,
            status: None,
            revision: 0,
        }
    }

    pub(crate) fn capture<I>(
        session: &Session<I>,
        remembered: Option<&Identity>,
        status: Option<&str>,
    ) -> Self
    where
        I: Copy + Ord + std::ops::Add<std::time::Duration, Output = I>,
    {
        Self {
            connection: session.connection_state(),
            phase: session.phase(),
            room_id: session.room_id().map(str::to_string),
            identity: session.identity().cloned(),
            remembered: remembered.cloned(),
            messages: session.messages().to_vec(),
            roster: session.roster().cloned().collect(),
            anyone_typing: session.anyone_typing(),
            status: status.map(str::to_string),
            revision: session.revision(),
        }
    }
}

impl Default for RoomSnapshot {
    fn default() -> Self {
        Self::initial()
    }
}
