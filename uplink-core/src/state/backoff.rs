//! Reconnect backoff.

use std::time::Duration;

/// Delay before the first reconnect attempt.
pub const MIN_BACKOFF: Duration = Duration::from_secs(3);

/// Upper bound on the reconnect delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Exponential backoff between failed connection cycles.
///
/// Starts at `min`, doubles after every failed cycle up to `max`, and
/// snaps back to `min` when a session reaches streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    current: Duration,
    min: Duration,
    max: Duration,
}

impl Backoff {
    /// 3 s doubling up to 60 s.
    pub fn new() -> Self {
        Self::with_bounds(MIN_BACKOFF, MAX_BACKOFF)
    }

    /// Custom bounds. `max` is raised to `min` if it is smaller.
    pub fn with_bounds(min: Duration, max: Duration) -> Self {
        Self {
            current: min,
            min,
            max: max.max(min),
        }
    }

    /// The delay the next failure will wait.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Return the delay for this failure and double it for the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Back to the minimum delay.
    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
