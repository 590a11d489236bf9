//! Session
//!
//! Action-based session state machine for Huddle chat rooms. Tracks the
//! connection state, the single active room, its message log and roster, and
//! transient typing signals.
//!
//! # Architecture
//!
//! The session follows the same Sans-IO and Action-Based patterns as
//! [`huddle_core`]. Intents are method calls that validate against the current
//! state; inbound traffic arrives as [`SessionEvent`]s. Both return
//! [`SessionAction`]s for the caller to execute.
//!
//! # Components
//!
//! - [`Session`]: Room membership state machine
//! - [`TypingDebouncer`]: Keystrokes to a low-frequency typing signal
//! - [`MessageLog`]: Append-only, deduplicated message history
//! - [`TypingSet`]: Remote participants currently typing
//! - [`Identity`] and [`ResumeRecord`]: What gets persisted between launches
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::ConnectedClient`]: Frame channels over QUIC
//! - [`transport::connect`]: Connect to a server

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod debounce;
mod error;
mod event;
mod identity;
mod log;
mod session;
mod typing;

#[cfg(feature = "transport")]
pub mod transport;

pub use debounce::{TYPING_IDLE_TIMEOUT, TypingDebouncer};
pub use error::SessionError;
pub use event::{SessionAction, SessionEvent};
pub use huddle_core::{ConnectionState, Environment};
pub use identity::{Identity, NICKNAME_MAX_CHARS, NICKNAME_MIN_CHARS, ResumeRecord};
pub use log::{Message, MessageLog};
pub use session::{MAX_MESSAGE_CHARS, Session, SessionPhase};
pub use typing::{TYPING_TTL, TypingSet};
