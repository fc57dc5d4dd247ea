//! Events emitted by the connection manager

use std::time::Duration;
use tokio::time::Instant;

/// Discrete notifications published to `observe_events()` subscribers.
///
/// Delivery order matches transition order, but events are best-effort
/// notifications: the state stream is authoritative, and a subscriber
/// joining late misses past events.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A session with the peer was established.
    Connected,
    /// The session was closed by an explicit `disconnect()`.
    Disconnected,
    /// A state-affecting failure (initial connect failure, unexpected
    /// transport close, fatal send error).
    Error { message: String },
    /// A retry was armed; `delay` is the jittered wait before it fires.
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// A scheduled retry is now driving the transport open.
    ReconnectAttempting { attempt: u32 },
    /// The episode recovered the session after `total_attempts` attempts.
    ReconnectSuccess { total_attempts: u32 },
    /// The episode was abandoned after exhausting all attempts.
    ReconnectFailed { reason: String },
    /// Liveness was lost: nothing inbound since `last_received_at`.
    HeartbeatTimeout { last_received_at: Instant },
}
