//! Session error types.
//!
//! Every variant is local and recoverable: the session is left in a
//! consistent state and the caller may retry with different input.

use thiserror::Error;

/// Errors returned by session intents.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The transport is not connected (or the room is still resyncing).
    #[error("not connected")]
    NotConnected,

    /// The operation requires room membership.
    #[error("not in a room")]
    NotInRoom,

    /// A create or join request is already outstanding.
    #[error("a create or join request is already in progress")]
    JoinInProgress,

    /// Message body failed local validation.
    #[error("invalid message: {reason}")]
    InvalidMessage {
        /// Why the body was rejected
        reason: String,
    },

    /// Nickname or icon failed local validation.
    #[error("invalid identity: {reason}")]
    InvalidIdentity {
        /// Why the identity was rejected
        reason: String,
    },

    /// Room id supplied to a join was empty after trimming.
    #[error("room id must not be empty")]
    InvalidRoomId,

    /// The backend has no room with this id.
    #[error("room not found: {room_id}")]
    RoomNotFound {
        /// Room that was requested
        room_id: String,
    },

    /// The backend refused the request.
    #[error("rejected by backend ({code:#06x}): {message}")]
    BackendRejected {
        /// Backend error code
        code: u16,
        /// Human-readable message from the backend
        message: String,
    },

    /// An inbound frame could not be decoded.
    #[error("invalid frame: {reason}")]
    InvalidFrame {
        /// Decode failure
        reason: String,
    },
}

impl From<huddle_proto::ProtocolError> for SessionError {
    fn from(err: huddle_proto::ProtocolError) -> Self {
        Self::InvalidFrame { reason: err.to_string() }
    }
}
