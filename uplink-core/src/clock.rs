//! Wall-clock source for ping timestamps and round-trip computation.
//!
//! The server echoes our own timestamp back, so both ends of a
//! round-trip measurement are read from the same [`Clock`].

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the UNIX epoch as a float.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> f64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_secs() > 1_577_836_800.0);
    }
}
