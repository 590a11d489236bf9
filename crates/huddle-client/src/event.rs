//! Session events and actions.

use huddle_core::ConnectionState;
use huddle_proto::Frame;

use crate::{
    error::SessionError,
    identity::{Identity, ResumeRecord},
};

/// Inbound events the caller feeds into the session.
///
/// Intents (create, join, send, ...) are method calls on
/// [`Session`](crate::Session) because they return a result to the caller.
/// Everything that originates outside the user arrives here.
///
/// Generic over `I` (Instant type) to support both production
/// (`std::time::Instant`) and simulation (`tokio::time::Instant`).
#[derive(Debug, Clone)]
pub enum SessionEvent<I = std::time::Instant> {
    /// The link changed state.
    ConnectionChanged(ConnectionState),

    /// A room or chat frame arrived from the backend.
    FrameReceived {
        /// The frame
        frame: Frame,
        /// Arrival time, used for typing expiry
        now: I,
    },

    /// Time tick for expiring typing entries.
    Tick {
        /// Current time from the environment.
        now: I,
    },
}

/// Actions the session produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Send a frame to the backend.
    Send(Frame),

    /// Bring the transport up.
    Connect,

    /// Tear the transport down.
    Close,

    /// A create/join request succeeded.
    RequestCompleted {
        /// Request that completed
        request_id: u32,
        /// Room now joined
        room_id: String,
    },

    /// A create/join request failed.
    RequestFailed {
        /// Request that failed
        request_id: u32,
        /// Why it failed
        error: SessionError,
    },

    /// The backend rejected something nobody is waiting on (a chat message,
    /// for instance). Reported once, never retried.
    Rejected(SessionError),

    /// The room disappeared while we were away.
    RoomLost {
        /// Room that is gone
        room_id: String,
        /// Reason given by the backend
        reason: String,
    },

    /// Store the resume record.
    PersistResume(ResumeRecord),

    /// Delete the stored resume record.
    ClearResume,

    /// Store the last-used identity for the next launch.
    RememberIdentity(Identity),
}
