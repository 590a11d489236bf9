//! Link layer state machine.
//!
//! Manages the client side of the transport link: the Hello/HelloReply
//! handshake, heartbeats, idle detection and graceful shutdown. Uses the
//! action pattern: methods take time as input and return actions for the
//! driver to execute.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐  Hello   ┌──────────┐   HelloReply    ┌───────────────┐
//! │ Init │─────────>│ Pending  │────────────────>│ Authenticated │
//! └──────┘          └──────────┘                 └───────────────┘
//!                        │                               │
//!                        │ Timeout/Goodbye               │ Goodbye/Timeout
//!                        ↓                               ↓
//!                   ┌────────┐                      ┌────────┐
//!                   │ Closed │                      │ Closed │
//!                   └────────┘                      └────────┘
//! ```
//!
//! The session layer never sees these four phases. It observes the coarser
//! [`ConnectionState`] projection.

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use huddle_proto::{
    Frame, FrameHeader, Opcode, Payload,
    payloads::session::{Goodbye, Hello},
};

use crate::error::ConnectionError;

/// Time allowed to complete the Hello/HelloReply handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum time allowed without inbound traffic before the link is dropped.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval at which Ping frames are sent while authenticated.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Protocol version spoken by this client.
pub const PROTOCOL_VERSION: u8 = 1;

/// Actions returned by the link state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Send this frame to the peer
    SendFrame(Frame),

    /// Handshake completed; the link is usable for room traffic
    Established {
        /// Server-assigned session identifier
        session_id: u64,
    },

    /// Close the transport with this reason
    Close {
        /// Reason for closing the connection
        reason: String,
    },
}

/// Process-wide connection state observed by the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No transport.
    #[default]
    Disconnected,
    /// Transport coming up or handshake in flight.
    Connecting,
    /// Handshake complete.
    Connected,
}

/// Internal phase of the link handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    /// Transport up, no handshake started
    Init,
    /// Hello sent, waiting for HelloReply
    Pending,
    /// HelloReply received
    Authenticated,
    /// Link closed (graceful or error)
    Closed,
}

/// Link configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for completing handshake
    pub handshake_timeout: Duration,
    /// Idle timeout before disconnecting
    pub idle_timeout: Duration,
    /// Heartbeat interval (should be < idle_timeout / 2)
    pub heartbeat_interval: Duration,
    /// Client name announced in Hello
    pub client_name: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            client_name: None,
        }
    }
}

/// Link state machine
///
/// Manages lifecycle, timeouts, and heartbeats for a single transport
/// connection. A fresh instance is created for every connect attempt.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug, Clone)]
pub struct Connection<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    phase: LinkPhase,
    config: ConnectionConfig,
    /// Last inbound frame (or handshake start)
    last_activity: I,
    /// Last heartbeat sent
    last_heartbeat: Option<I>,
    /// Assigned by server in HelloReply
    session_id: Option<u64>,
}

impl<I> Connection<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a new link in [`LinkPhase::Init`]
    pub fn new(now: I, config: ConnectionConfig) -> Self {
        Self { phase: LinkPhase::Init, config, last_activity: now, last_heartbeat: None, session_id: None }
    }

    /// Current handshake phase
    #[must_use]
    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    /// Projection onto the session-visible connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        match self.phase {
            LinkPhase::Init | LinkPhase::Pending => ConnectionState::Connecting,
            LinkPhase::Authenticated => ConnectionState::Connected,
            LinkPhase::Closed => ConnectionState::Disconnected,
        }
    }

    /// Session ID assigned by server. `None` if not authenticated.
    #[must_use]
    pub fn session_id(&self) -> Option<u64> {
        self.session_id
    }

    /// Initiate handshake.
    ///
    /// Transitions to Pending and returns `SendFrame(Hello)`.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` if not in Init
    pub fn send_hello(&mut self, now: I) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if self.phase != LinkPhase::Init {
            return Err(ConnectionError::InvalidState { phase: self.phase, operation: "send_hello" });
        }

        self.phase = LinkPhase::Pending;
        self.last_activity = now;

        let hello = Payload::Hello(Hello {
            version: PROTOCOL_VERSION,
            client_name: self.config.client_name.clone(),
        });
        let frame = hello.into_frame(FrameHeader::new(Opcode::Hello))?;

        Ok(vec![ConnectionAction::SendFrame(frame)])
    }

    /// Say goodbye and close.
    ///
    /// Sends Goodbye only when the peer would understand it (handshake
    /// started). Idempotent once closed.
    pub fn goodbye(&mut self, reason: &str) -> Vec<ConnectionAction> {
        let was = self.phase;
        self.close();

        match was {
            LinkPhase::Pending | LinkPhase::Authenticated => {
                let goodbye = Payload::Goodbye(Goodbye { reason: reason.to_string() });
                match goodbye.into_frame(FrameHeader::new(Opcode::Goodbye)) {
                    Ok(frame) => vec![ConnectionAction::SendFrame(frame), ConnectionAction::Close {
                        reason: reason.to_string(),
                    }],
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode Goodbye");
                        vec![ConnectionAction::Close { reason: reason.to_string() }]
                    },
                }
            },
            LinkPhase::Init => vec![ConnectionAction::Close { reason: reason.to_string() }],
            LinkPhase::Closed => vec![],
        }
    }

    /// Record inbound traffic that bypassed [`Self::handle_frame`].
    ///
    /// Room and chat frames prove the peer is alive just as well as a Pong.
    pub fn update_activity(&mut self, now: I) {
        if self.phase != LinkPhase::Closed {
            self.last_activity = now;
        }
    }

    /// Mark link as closed.
    pub fn close(&mut self) {
        self.phase = LinkPhase::Closed;
    }

    /// Elapsed time since last activity, if timeout exceeded. `None` otherwise.
    #[must_use]
    pub fn check_timeout(&self, now: I) -> Option<Duration> {
        let elapsed = now - self.last_activity;

        let timeout = match self.phase {
            LinkPhase::Pending => self.config.handshake_timeout,
            LinkPhase::Authenticated => self.config.idle_timeout,
            LinkPhase::Init | LinkPhase::Closed => return None,
        };

        if elapsed > timeout { Some(elapsed) } else { None }
    }

    /// The error a timeout at `now` corresponds to, if any.
    #[must_use]
    pub fn timeout_error(&self, now: I) -> Option<ConnectionError> {
        let elapsed = self.check_timeout(now)?;
        match self.phase {
            LinkPhase::Pending => Some(ConnectionError::HandshakeTimeout { elapsed }),
            _ => Some(ConnectionError::IdleTimeout { elapsed }),
        }
    }

    /// Process periodic maintenance (timeouts and heartbeats).
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        if let Some(error) = self.timeout_error(now) {
            self.close();
            return vec![ConnectionAction::Close { reason: error.to_string() }];
        }

        if self.phase != LinkPhase::Authenticated {
            return vec![];
        }

        let should_send = match self.last_heartbeat {
            None => true,
            Some(last) => now - last >= self.config.heartbeat_interval,
        };

        if should_send {
            self.last_heartbeat = Some(now);
            vec![ConnectionAction::SendFrame(Frame::empty(Opcode::Ping))]
        } else {
            vec![]
        }
    }

    /// Process an incoming link frame.
    ///
    /// Only session-management opcodes belong here; room and chat traffic is
    /// routed to the session layer by the caller.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::UnexpectedFrame` if opcode invalid for current phase
    /// - `ConnectionError::Protocol` if the payload does not decode
    pub fn handle_frame(
        &mut self,
        frame: &Frame,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        let Some(opcode) = frame.header.opcode_enum() else {
            return Err(ConnectionError::UnexpectedFrame {
                phase: self.phase,
                opcode: frame.header.opcode(),
            });
        };

        if self.phase != LinkPhase::Closed {
            self.last_activity = now;
        }

        match (self.phase, opcode) {
            (LinkPhase::Pending, Opcode::HelloReply) => match Payload::from_frame(frame)? {
                Payload::HelloReply(reply) => {
                    self.phase = LinkPhase::Authenticated;
                    self.session_id = Some(reply.session_id);
                    self.last_heartbeat = Some(now);

                    tracing::debug!(session_id = reply.session_id, "handshake complete");

                    Ok(vec![ConnectionAction::Established { session_id: reply.session_id }])
                },
                _ => Err(ConnectionError::Protocol("HelloReply payload mismatch".to_string())),
            },

            (LinkPhase::Authenticated, Opcode::Ping) => {
                Ok(vec![ConnectionAction::SendFrame(Frame::empty(Opcode::Pong))])
            },

            // Activity already updated
            (LinkPhase::Authenticated, Opcode::Pong) => Ok(vec![]),

            (phase, Opcode::Goodbye) if phase != LinkPhase::Closed => {
                let reason = match Payload::from_frame(frame)? {
                    Payload::Goodbye(goodbye) => goodbye.reason,
                    _ => String::new(),
                };

                self.close();

                Ok(vec![ConnectionAction::Close { reason: format!("peer goodbye: {reason}") }])
            },

            (phase, opcode) => {
                Err(ConnectionError::UnexpectedFrame { phase, opcode: opcode.to_u16() })
            },
        }
    }
}
