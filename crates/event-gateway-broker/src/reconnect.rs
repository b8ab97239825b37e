// File: src/reconnect.rs
//
// Exponential-backoff reconnection schedule for broker sessions

use std::time::Duration;

use event_gateway_core::config::ArtemisConfig;

/// Iterator over reconnect delays: `initial * multiplier^n`, capped at
/// the configured maximum. A negative attempt budget means retry
/// forever — the default, because broker loss must pause consumers
/// rather than kill the process.
#[derive(Debug, Clone)]
pub struct ReconnectSchedule {
    next_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    remaining: Option<u32>,
}

impl ReconnectSchedule {
    pub fn from_config(config: &ArtemisConfig) -> Self {
        Self {
            next_delay: config.retry_interval,
            multiplier: config.retry_multiplier.max(1.0),
            max_delay: config.max_retry_interval,
            remaining: u32::try_from(config.reconnect_attempts).ok(),
        }
    }

    /// Delay before the next attempt, or `None` when the budget is
    /// exhausted. Resets are explicit via [`ReconnectSchedule::reset`].
    pub fn next_backoff(&mut self) -> Option<Duration> {
        match &mut self.remaining {
            Some(0) => return None,
            Some(n) => *n -= 1,
            None => {}
        }
        let delay = self.next_delay;
        let scaled = self.next_delay.as_millis() as f64 * self.multiplier;
        self.next_delay = Duration::from_millis(scaled as u64).min(self.max_delay);
        Some(delay)
    }

    /// Call after a successful (re)connection so the next outage starts
    /// from the initial interval again.
    pub fn reset(&mut self, config: &ArtemisConfig) {
        *self = Self::from_config(config);
    }
}
