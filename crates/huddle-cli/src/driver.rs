//! QUIC implementation of the runtime [`Driver`].
//!
//! Wraps a [`ConnectedClient`] from `huddle_client::transport`. The client's
//! inbound channel closing is what surfaces a lost connection.

use huddle_app::{Driver, TransportEvent};
use huddle_client::transport::{self, ConnectedClient, TransportError};
use huddle_proto::Frame;

/// Driver talking to a real backend over QUIC.
#[derive(Default)]
pub struct QuicDriver {
    client: Option<ConnectedClient>,
    announce: bool,
}

impl QuicDriver {
    /// A driver with no connection yet.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Driver for QuicDriver {
    type Error = TransportError;

    async fn connect(&mut self, addr: &str) -> Result<(), Self::Error> {
        if let Some(old) = self.client.take() {
            old.close("reconnecting");
        }

        let client = transport::connect(addr).await?;
        tracing::info!(%addr, "connected");
        self.client = Some(client);
        self.announce = true;
        Ok(())
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<(), Self::Error> {
        match &self.client {
            Some(client) => client.send(frame).await,
            None => Err(TransportError::Closed),
        }
    }

    async fn next_event(&mut self) -> TransportEvent {
        if self.announce {
            self.announce = false;
            return TransportEvent::Connected;
        }

        let Some(client) = self.client.as_mut() else {
            return std::future::pending().await;
        };

        match client.recv().await {
            Some(frame) => TransportEvent::Frame(frame),
            None => {
                let reason =
                    client.close_reason().unwrap_or_else(|| "connection closed".to_string());
                tracing::info!(%reason, "disconnected");
                self.client = None;
                TransportEvent::Disconnected { reason }
            },
        }
    }

    fn close(&mut self, reason: &str) {
        if let Some(client) = self.client.take() {
            client.close(reason);
        }
        self.announce = false;
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use huddle_proto::Opcode;

    use super::*;

    #[tokio::test]
    async fn idle_driver_stays_pending() {
        let mut driver = QuicDriver::new();

        let event = tokio::time::timeout(Duration::from_millis(10), driver.next_event()).await;

        assert!(event.is_err());
        assert!(!driver.is_connected());
    }

    #[tokio::test]
    async fn send_without_connection_fails() {
        let mut driver = QuicDriver::new();

        let result = driver.send_frame(Frame::empty(Opcode::Ping)).await;

        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn bad_address_is_a_connect_error() {
        let mut driver = QuicDriver::new();

        let result = driver.connect("not an address").await;

        assert!(matches!(result, Err(TransportError::Connection(_))));
        assert!(!driver.is_connected());
    }
}
