//! Driver trait for abstracting transport I/O.
//!
//! The [`Driver`] trait decouples the runtime from a specific transport. Each
//! frontend implements it, while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::future::Future;

use huddle_proto::Frame;

/// Something the transport wants the runtime to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The transport came up after [`Driver::connect`].
    Connected,
    /// The transport went away.
    Disconnected {
        /// Why, as reported by the transport
        reason: String,
    },
    /// A frame arrived.
    Frame(Frame),
}

/// Abstracts transport operations for the runtime.
///
/// # Implementations
///
/// - **CLI**: QUIC via `huddle_client::transport`
/// - **Simulation**: in-memory channels with a scripted backend
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Establish a connection.
    ///
    /// On success the next [`Self::next_event`] yields
    /// [`TransportEvent::Connected`].
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    fn connect(&mut self, addr: &str) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Send a frame to the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed or send fails.
    fn send_frame(&mut self, frame: Frame) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Wait for the next transport event.
    ///
    /// Stays pending while there is nothing to report, including while
    /// disconnected. Must be cancel-safe: the runtime polls it inside
    /// `tokio::select!`.
    fn next_event(&mut self) -> impl Future<Output = TransportEvent> + Send;

    /// Drop the connection. Idempotent. Does not produce a
    /// [`TransportEvent::Disconnected`].
    fn close(&mut self, reason: &str);

    /// Check if connected.
    fn is_connected(&self) -> bool;
}
