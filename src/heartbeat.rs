//! Liveness tracking for an active session
//!
//! Any inbound traffic from the peer (including protocol-level pings)
//! counts as a heartbeat. The manager polls the monitor on a fixed
//! interval and declares the connection lost once nothing has arrived
//! within the configured timeout.

use std::time::Duration;
use tokio::time::Instant;

/// Tracks when the peer was last heard from.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    last_received_at: Instant,
    timeout: Duration,
}

impl HeartbeatMonitor {
    /// Start tracking from now. Called when a session is established, so a
    /// fresh connection gets the full timeout before it can be declared dead.
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_received_at: Instant::now(),
            timeout,
        }
    }

    /// Record inbound traffic from the peer.
    pub fn touch(&mut self) {
        self.last_received_at = Instant::now();
    }

    /// When the peer was last heard from.
    pub fn last_received_at(&self) -> Instant {
        self.last_received_at
    }

    /// Whether the silence has exceeded the timeout as of `now`.
    pub fn is_timed_out(&self, now: Instant) -> bool {
        now.duration_since(self.last_received_at) > self.timeout
    }
}
