//! QUIC plumbing beneath the session.
//!
//! [`connect`] dials the backend and hands back a [`ConnectedClient`]: two
//! channels and a background task that shuttles frames between them and the
//! QUIC connection. Nothing here interprets a frame beyond its header; that
//! is the job of [`Session`](crate::Session) and
//! [`Connection`](huddle_core::Connection).
//!
//! Each outbound frame rides its own bidirectional stream. The backend pushes
//! frames on unidirectional streams, one frame per stream, read strictly in
//! the order they were opened. Once the QUIC connection is gone the inbound
//! channel closes and [`ConnectedClient::recv`] yields `None`.

use std::{
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use bytes::BytesMut;
use huddle_proto::{Frame, FrameHeader};
use quinn::{Endpoint, RecvStream, SendStream};
use rustls::{
    DigitallySignedStruct, SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    pki_types::{CertificateDer, ServerName, UnixTime},
};
use thiserror::Error;
use tokio::{sync::mpsc, task::AbortHandle};

/// ALPN identifier both sides must agree on.
pub const ALPN: &[u8] = b"huddle";

/// Outlives the link heartbeat so silence is noticed by the link layer first.
const QUIC_IDLE_TIMEOUT: Duration = Duration::from_secs(45);

const CHANNEL_CAPACITY: usize = 32;

/// Failures below the frame codec.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach or set up the backend connection.
    #[error("cannot connect: {0}")]
    Connection(String),

    /// A QUIC stream broke mid-frame.
    #[error("stream: {0}")]
    Stream(String),

    /// Bytes on a stream were not a frame.
    #[error("bad frame on stream: {0}")]
    Protocol(String),

    /// The background task is gone.
    #[error("connection closed")]
    Closed,
}

/// A live backend connection.
///
/// Dropping it stops the background task.
pub struct ConnectedClient {
    outbound: mpsc::Sender<Frame>,
    inbound: mpsc::Receiver<Frame>,
    quic: quinn::Connection,
    pump: AbortHandle,
}

impl ConnectedClient {
    /// Hand a frame to the background task.
    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.outbound.send(frame).await.map_err(|_| TransportError::Closed)
    }

    /// Next frame pushed by the backend, `None` after the connection ended.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.inbound.recv().await
    }

    /// Why the connection ended, if it has.
    pub fn close_reason(&self) -> Option<String> {
        self.quic.close_reason().map(|reason| reason.to_string())
    }

    /// Close with an application reason and stop the background task.
    pub fn close(&self, reason: &str) {
        self.quic.close(0u32.into(), reason.as_bytes());
        self.pump.abort();
    }
}

impl Drop for ConnectedClient {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Dial `server_addr` (an `ip:port` literal) over QUIC.
///
/// # Errors
///
/// `TransportError::Connection` if the address does not parse, no local
/// endpoint can be bound or the QUIC handshake fails.
pub async fn connect(server_addr: &str) -> Result<ConnectedClient, TransportError> {
    let remote: SocketAddr = server_addr
        .parse()
        .map_err(|e| TransportError::Connection(format!("{server_addr:?} is not ip:port ({e})")))?;

    let local: SocketAddr = match remote {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };

    let mut endpoint = Endpoint::client(local)
        .map_err(|e| TransportError::Connection(format!("bind {local}: {e}")))?;
    endpoint.set_default_client_config(client_config()?);

    let connecting = endpoint
        .connect(remote, "localhost")
        .map_err(|e| TransportError::Connection(format!("dial {remote}: {e}")))?;
    let quic = connecting
        .await
        .map_err(|e| TransportError::Connection(format!("handshake with {remote}: {e}")))?;

    tracing::debug!(%remote, "quic connection established");

    let (outbound, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (inbound_tx, inbound) = mpsc::channel(CHANNEL_CAPACITY);
    let pump = tokio::spawn(pump(quic.clone(), outbound_rx, inbound_tx)).abort_handle();

    Ok(ConnectedClient { outbound, inbound, quic, pump })
}

/// Move frames both ways until the connection or the client goes away.
async fn pump(quic: quinn::Connection, mut outbound: mpsc::Receiver<Frame>, inbound: mpsc::Sender<Frame>) {
    let reader = tokio::spawn(accept_pushes(quic.clone(), inbound));

    loop {
        tokio::select! {
            next = outbound.recv() => {
                let Some(frame) = next else { break };
                let send = match quic.open_bi().await {
                    Ok((send, _)) => send,
                    Err(e) => {
                        tracing::debug!(error = %e, "cannot open stream");
                        break;
                    },
                };
                if let Err(e) = write_frame(send, &frame).await {
                    tracing::warn!(error = %e, opcode = frame.header.opcode(), "frame not sent");
                }
            }
            reason = quic.closed() => {
                tracing::debug!(%reason, "connection closed");
                break;
            }
        }
    }

    reader.abort();
}

/// Read backend-initiated streams one after another.
///
/// Streams are accepted in the order the backend opened them and each is
/// drained before the next, so frames reach the session in delivery order.
async fn accept_pushes(quic: quinn::Connection, inbound: mpsc::Sender<Frame>) {
    loop {
        let stream = match quic.accept_uni().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::debug!(error = %e, "no more inbound streams");
                return;
            },
        };
        match read_frame(stream).await {
            Ok(frame) => {
                if inbound.send(frame).await.is_err() {
                    return;
                }
            },
            Err(e) => tracing::warn!(error = %e, "dropped inbound stream"),
        }
    }
}

async fn read_frame(mut stream: RecvStream) -> Result<Frame, TransportError> {
    let mut buf = BytesMut::zeroed(FrameHeader::SIZE);
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| TransportError::Stream(format!("reading header: {e}")))?;

    let body_len = FrameHeader::from_bytes(&buf)
        .map_err(|e| TransportError::Protocol(e.to_string()))?
        .payload_size() as usize;

    if body_len > 0 {
        buf.resize(FrameHeader::SIZE + body_len, 0);
        stream
            .read_exact(&mut buf[FrameHeader::SIZE..])
            .await
            .map_err(|e| TransportError::Stream(format!("reading {body_len} byte body: {e}")))?;
    }

    Frame::decode(&buf).map_err(|e| TransportError::Protocol(e.to_string()))
}

async fn write_frame(mut stream: SendStream, frame: &Frame) -> Result<(), TransportError> {
    let mut wire = Vec::with_capacity(FrameHeader::SIZE + frame.payload.len());
    frame.encode(&mut wire).map_err(|e| TransportError::Protocol(e.to_string()))?;

    stream.write_all(&wire).await.map_err(|e| TransportError::Stream(e.to_string()))?;
    stream.finish().map_err(|e| TransportError::Stream(e.to_string()))
}

/// TLS without certificate checks, plus the QUIC idle timeout.
///
/// Only suitable against a development backend.
fn client_config() -> Result<quinn::ClientConfig, TransportError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut tls = rustls::ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| TransportError::Connection(format!("tls config rejected: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(TrustAnything))
        .with_no_client_auth();
    tls.alpn_protocols = vec![ALPN.to_vec()];

    let quic = quinn::crypto::rustls::QuicClientConfig::try_from(tls)
        .map_err(|e| TransportError::Connection(format!("tls config rejected: {e}")))?;

    let idle = quinn::IdleTimeout::try_from(QUIC_IDLE_TIMEOUT)
        .map_err(|e| TransportError::Connection(format!("idle timeout: {e}")))?;
    let mut limits = quinn::TransportConfig::default();
    limits.max_idle_timeout(Some(idle));

    let mut config = quinn::ClientConfig::new(Arc::new(quic));
    config.transport_config(Arc::new(limits));
    Ok(config)
}

#[derive(Debug)]
struct TrustAnything;

impl ServerCertVerifier for TrustAnything {
    fn verify_server_cert(
        &self,
        _: &CertificateDer<'_>,
        _: &[CertificateDer<'_>],
        _: &ServerName<'_>,
        _: &[u8],
        _: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _: &[u8],
        _: &CertificateDer<'_>,
        _: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _: &[u8],
        _: &CertificateDer<'_>,
        _: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider().signature_verification_algorithms.supported_schemes()
    }
}
