//! Error types for the connection manager and transport boundary

use std::time::Duration;
use thiserror::Error;

/// Error reported by a transport implementation.
///
/// Transports classify their own failures: a fatal error means the link is
/// down and the manager may start a reconnection episode; a non-fatal error
/// (e.g. a single send that was dropped) is returned to the caller of that
/// operation without touching the connection state.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    fatal: bool,
}

impl TransportError {
    /// A failure that means the underlying link is gone.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: true,
        }
    }

    /// A failure scoped to one operation; the link is still usable.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: false,
        }
    }

    /// Whether this error indicates connection loss.
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// Human-readable failure description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        // I/O errors on a stream mean the link can no longer be trusted
        TransportError::fatal(e.to_string())
    }
}

/// Errors returned by [`ConnectionManager`](crate::ConnectionManager) operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// `connect()` was called with an empty peer id.
    #[error("peer id must not be empty")]
    InvalidPeerId,

    /// `connect()` was called while a session with a different peer is
    /// active or being recovered.
    #[error("already connected to peer {0}")]
    AlreadyConnected(String),

    /// The initial transport open failed. Not auto-retried; the caller must
    /// invoke `connect()` again.
    #[error("transport open failed: {0}")]
    OpenFailed(#[source] TransportError),

    /// The transport did not open within the configured connect timeout.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The operation requires an active session.
    #[error("not connected")]
    NotConnected,

    /// A transport failure during an active send.
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),

    /// The operation was cancelled by `disconnect()` or `cancel_reconnect()`.
    #[error("operation cancelled")]
    Cancelled,

    /// The manager task has shut down.
    #[error("connection manager is closed")]
    Closed,
}
