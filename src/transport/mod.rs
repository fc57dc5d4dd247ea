//! Transport trait abstraction for pluggable P2P backends

pub mod tcp;

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

pub use tcp::TcpTransport;

/// A session handle plus the inbound payload stream for that session.
///
/// The receiver yields every payload pushed by the peer; it closing means
/// the underlying link dropped unexpectedly.
pub type OpenedSession = (Box<dyn TransportSession>, mpsc::Receiver<Bytes>);

/// Factory for opening sessions to a peer.
///
/// Implementations own the actual wire protocol (framing, encryption
/// handshake); the connection manager only drives open/send/close. Once a
/// manager is constructed over a transport, nothing else may call it
/// directly.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Attempt to open an authenticated session with the peer.
    ///
    /// Called for the initial connect and again for every reconnection
    /// attempt; each call must produce an independent session. Dropping the
    /// returned future aborts the open.
    async fn open(&self, peer_id: &str, credential: &str)
        -> Result<OpenedSession, TransportError>;
}

/// An open link to the peer.
#[async_trait]
pub trait TransportSession: Send {
    /// Send one payload to the peer.
    ///
    /// Errors must be classified: [`TransportError::is_fatal`] decides
    /// whether the failure tears the connection down or is only reported to
    /// the caller of the send.
    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError>;

    /// Close the link. Best-effort; errors are swallowed.
    async fn close(&mut self);
}

/// Source of the local signing key used by transports during their
/// handshake. Backed by the platform keystore in real deployments; its
/// internals are outside this crate.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch the local device's signing key material.
    async fn signing_key(&self) -> Result<Bytes, TransportError>;
}
