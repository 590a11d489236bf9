//! Huddle link-layer core
//!
//! Pure state machine logic for the transport link, completely decoupled from
//! I/O. Methods take the current time as input and return actions describing
//! the effects the caller must perform.
//!
//! # Components
//!
//! - [`connection`]: Link state machine (handshake, heartbeat, idle timeout)
//! - [`reconnect`]: Exponential backoff for re-establishing the link
//! - [`mod@env`]: Environment abstraction (time, RNG)
//! - [`error`]: Link error types

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;
pub mod reconnect;

pub use connection::{Connection, ConnectionAction, ConnectionConfig, ConnectionState, LinkPhase};
pub use env::Environment;
pub use error::ConnectionError;
pub use reconnect::{Backoff, ReconnectPolicy};
