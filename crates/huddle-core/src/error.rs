//! Link-layer errors.
//!
//! These never reach the presentation layer. The runtime logs them and, where
//! the link is no longer usable, reports a disconnect so the session keeps
//! its room for a resume.

use std::time::Duration;

use thiserror::Error;

use crate::connection::LinkPhase;

/// What went wrong on the link.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// An operation was attempted in a phase that does not allow it.
    #[error("cannot {operation} while {phase:?}")]
    InvalidState {
        /// Phase at the time
        phase: LinkPhase,
        /// What was attempted
        operation: &'static str,
    },

    /// A link frame arrived that the current phase does not expect.
    #[error("opcode {opcode:#06x} not expected while {phase:?}")]
    UnexpectedFrame {
        /// Phase at the time
        phase: LinkPhase,
        /// Raw opcode of the frame
        opcode: u16,
    },

    /// No `HelloReply` within the handshake timeout.
    #[error("handshake timeout after {elapsed:?}")]
    HandshakeTimeout {
        /// Time since the hello went out
        elapsed: Duration,
    },

    /// Nothing received within the idle timeout.
    #[error("idle timeout after {elapsed:?}")]
    IdleTimeout {
        /// Time since the last inbound frame
        elapsed: Duration,
    },

    /// A link frame failed to decode.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<huddle_proto::ProtocolError> for ConnectionError {
    fn from(err: huddle_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
