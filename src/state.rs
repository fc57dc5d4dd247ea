//! Connection states and the data carried alongside them

use std::time::Duration;
use tokio::time::Instant;

/// The single authoritative lifecycle state of a managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No session and no recovery in progress.
    #[default]
    Disconnected,
    /// A `connect()` call is driving the transport open.
    Connecting,
    /// An authenticated session with the peer is live.
    Connected,
    /// The session was lost and a reconnection episode is running.
    Reconnecting,
    /// A connect failed or a reconnection episode was exhausted.
    /// Recoverable via an explicit `connect()`.
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

/// The remote endpoint of the current session.
///
/// Present exactly while the state is [`ConnectionState::Connected`];
/// replaced with a fresh `connected_at` on every successful reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Opaque identifier of the remote device, unique per peer.
    pub peer_id: String,
    /// Stable identity credential (e.g. a DID string) used to authenticate
    /// the peer across reconnects.
    pub peer_identity: String,
    /// Monotonic timestamp of when the current session was established.
    pub connected_at: Instant,
}

/// Snapshot of an in-progress reconnection episode.
///
/// Present exactly while the state is [`ConnectionState::Reconnecting`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectionStatus {
    /// 1-based counter of the current retry attempt.
    pub attempt: u32,
    /// Delay before the pending attempt fires.
    pub next_delay: Duration,
    /// Configured ceiling; the episode is abandoned past this.
    pub max_attempts: u32,
}

/// Check whether a transition between two states is defined by the
/// lifecycle table. `Disconnected` is reachable from anywhere via an
/// explicit `disconnect()`.
pub fn is_valid_transition(from: ConnectionState, to: ConnectionState) -> bool {
    use ConnectionState::*;

    match (from, to) {
        (a, b) if a == b => true,
        (_, Disconnected) => true,

        (Disconnected, Connecting) => true,
        (Error, Connecting) => true,
        (Connecting, Connected) => true,
        (Connecting, Error) => true,
        (Connected, Reconnecting) => true,
        // Loss with auto-reconnect disabled
        (Connected, Error) => true,
        (Reconnecting, Connected) => true,
        (Reconnecting, Error) => true,

        _ => false,
    }
}
