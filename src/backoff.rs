//! Exponential backoff schedule for reconnection attempts

use rand::Rng;
use std::time::Duration;

/// Largest exponent applied to the base delay. Past this the schedule is
/// certain to have hit `max_delay` for any sane configuration.
const MAX_SHIFT: u32 = 20;

/// Jitter applied to each delay, as a fraction of the pre-jitter value.
const JITTER_FRACTION: f64 = 0.2;

/// Capped exponential backoff with jitter.
///
/// The delay before attempt `n` (1-based) is
/// `min(base_delay * 2^(n-1), max_delay)`, perturbed by ±20% so that many
/// clients recovering from a shared network blip do not retry in lockstep.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt.
    pub base_delay: Duration,
    /// Ceiling on any single delay (pre-jitter).
    pub max_delay: Duration,
    /// Attempts allowed per episode before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 8,
        }
    }
}

impl ReconnectPolicy {
    /// Pre-jitter delay for a 1-based attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(MAX_SHIFT);
        let factor = 1u32 << shift;
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Jittered delay for a 1-based attempt number.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt);
        let scale = rand::thread_rng().gen_range(1.0 - JITTER_FRACTION..=1.0 + JITTER_FRACTION);
        base.mul_f64(scale)
    }

    /// Whether an attempt number is within the configured ceiling.
    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}
