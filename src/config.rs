//! Configuration for the connection manager

use crate::backoff::ReconnectPolicy;
use std::time::Duration;

/// Tunables for a [`ConnectionManager`](crate::ConnectionManager) instance.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How long the initial `connect()` may stay in `Connecting` before
    /// failing.
    pub connect_timeout: Duration,
    /// Bound on each reconnection attempt's transport open.
    pub attempt_timeout: Duration,
    /// How often the heartbeat monitor is polled while connected.
    pub heartbeat_interval: Duration,
    /// Silence longer than this is treated as connection loss.
    pub heartbeat_timeout: Duration,
    /// Backoff schedule for reconnection episodes.
    pub reconnect: ReconnectPolicy,
    /// Whether losses after a successful connect start a reconnection
    /// episode. Initial connect failures are never auto-retried.
    pub auto_reconnect: bool,
    /// Buffer size of the event and inbound broadcast channels.
    pub channel_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(1),
            heartbeat_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
            auto_reconnect: true,
            channel_capacity: 64,
        }
    }
}
