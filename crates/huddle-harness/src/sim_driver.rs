//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` stands in for the QUIC driver. It implements [`Driver`] so the
//! same [`huddle_app::Runtime`] orchestration code runs in both production
//! and simulation, with a [`SimBackend`] on the other end.

use huddle_app::{Driver, TransportEvent};
use huddle_proto::Frame;

use crate::{SimBackend, backend::LinkEvents};

/// Error type for simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

struct ActiveLink {
    id: u64,
    events: LinkEvents,
}

/// Simulation driver for deterministic testing.
pub struct SimDriver {
    backend: SimBackend,
    link: Option<ActiveLink>,
}

impl SimDriver {
    /// Driver talking to `backend`.
    pub fn new(backend: SimBackend) -> Self {
        Self { backend, link: None }
    }

    /// Backend link id of the open link.
    pub fn link_id(&self) -> Option<u64> {
        self.link.as_ref().map(|link| link.id)
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;

    async fn connect(&mut self, _addr: &str) -> Result<(), Self::Error> {
        if let Some(old) = self.link.take() {
            self.backend.close_link(old.id);
        }

        let (id, events) = self.backend.open_link()?;
        self.link = Some(ActiveLink { id, events });
        Ok(())
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<(), Self::Error> {
        let Some(link) = &self.link else {
            return Err(SimDriverError("not connected".to_string()));
        };
        self.backend.deliver(link.id, frame)
    }

    async fn next_event(&mut self) -> TransportEvent {
        let Some(link) = self.link.as_mut() else {
            return std::future::pending().await;
        };

        match link.events.recv().await {
            Some(TransportEvent::Disconnected { reason }) => {
                self.link = None;
                TransportEvent::Disconnected { reason }
            },
            Some(event) => event,
            None => {
                self.link = None;
                TransportEvent::Disconnected { reason: "backend went away".to_string() }
            },
        }
    }

    fn close(&mut self, _reason: &str) {
        if let Some(link) = self.link.take() {
            self.backend.close_link(link.id);
        }
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }
}

#[cfg(test)]
mod tests {
    use huddle_proto::{Opcode, Payload, payloads::session::Hello};

    use super::*;

    #[tokio::test]
    async fn connect_yields_connected_then_replies() {
        let backend = SimBackend::new();
        let mut driver = SimDriver::new(backend.clone());

        driver.connect("sim").await.unwrap();
        assert_eq!(driver.next_event().await, TransportEvent::Connected);

        let hello = Payload::Hello(Hello { version: 1, client_name: None }).into_request(0).unwrap();
        driver.send_frame(hello).await.unwrap();

        let TransportEvent::Frame(reply) = driver.next_event().await else {
            panic!("expected a frame");
        };
        assert_eq!(reply.opcode(), Some(Opcode::HelloReply));
    }

    #[tokio::test]
    async fn send_without_link_fails() {
        let mut driver = SimDriver::new(SimBackend::new());

        assert!(driver.send_frame(Frame::empty(Opcode::Ping)).await.is_err());
        assert!(!driver.is_connected());
    }

    #[tokio::test]
    async fn backend_drop_surfaces_once() {
        let backend = SimBackend::new();
        let mut driver = SimDriver::new(backend.clone());
        driver.connect("sim").await.unwrap();
        let _ = driver.next_event().await;

        backend.drop_link(driver.link_id().unwrap(), "fault");

        assert_eq!(
            driver.next_event().await,
            TransportEvent::Disconnected { reason: "fault".to_string() }
        );
        assert!(!driver.is_connected());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_silent() {
        let backend = SimBackend::new();
        let mut driver = SimDriver::new(backend.clone());
        driver.connect("sim").await.unwrap();

        driver.close("bye");
        driver.close("bye");

        assert!(backend.links().is_empty());
        let pending = tokio::time::timeout(std::time::Duration::from_millis(10), driver.next_event());
        assert!(pending.await.is_err());
    }
}
