//! Latency-driven quality control.
//!
//! [`LatencyController`] owns the session's quality level and is its only
//! writer. The frame uplink reads the level through a [`QualityReader`];
//! both share one atomic byte, so no lock is taken on the frame path.
//!
//! The step function reacts to the latest round-trip sample only:
//!
//! | round trip        | action                               |
//! |-------------------|--------------------------------------|
//! | `> 200 ms`        | lower by 10, not below [`MIN_QUALITY`] |
//! | `< 100 ms`        | raise by 10, not above [`SOFT_MAX_QUALITY`] |
//! | `100..=200 ms`    | unchanged                            |

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

// ── Constants ────────────────────────────────────────────────────

/// Lowest quality the controller will go to.
pub const MIN_QUALITY: u8 = 10;

/// Ceiling for latency-driven increases.
pub const SOFT_MAX_QUALITY: u8 = 70;

/// Absolute ceiling, reachable only by manual override.
pub const HARD_MAX_QUALITY: u8 = 95;

/// Level a fresh pipeline starts at.
pub const DEFAULT_QUALITY: u8 = 70;

/// Round trips above this lower the quality.
pub const HIGH_LATENCY_MS: f64 = 200.0;

/// Round trips below this raise the quality.
pub const LOW_LATENCY_MS: f64 = 100.0;

const QUALITY_STEP: u8 = 10;

// ── QualityLevel ─────────────────────────────────────────────────

/// Compression quality in `[MIN_QUALITY, HARD_MAX_QUALITY]`.
///
/// Higher means better fidelity and larger payloads. Construction
/// clamps, so an out-of-range level cannot exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualityLevel(u8);

impl QualityLevel {
    pub const MIN: Self = Self(MIN_QUALITY);
    pub const SOFT_MAX: Self = Self(SOFT_MAX_QUALITY);
    pub const HARD_MAX: Self = Self(HARD_MAX_QUALITY);

    /// Clamp `value` into range.
    pub fn new(value: u8) -> Self {
        Self(value.clamp(MIN_QUALITY, HARD_MAX_QUALITY))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Next level after a round-trip sample of `rtt_ms`.
    pub fn step(self, rtt_ms: f64) -> Self {
        let level = self.0;
        if rtt_ms > HIGH_LATENCY_MS && level > MIN_QUALITY {
            Self(level.saturating_sub(QUALITY_STEP).max(MIN_QUALITY))
        } else if rtt_ms < LOW_LATENCY_MS && level < SOFT_MAX_QUALITY {
            Self((level + QUALITY_STEP).min(SOFT_MAX_QUALITY))
        } else {
            self
        }
    }
}

impl Default for QualityLevel {
    fn default() -> Self {
        Self(DEFAULT_QUALITY)
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── LatencyController ────────────────────────────────────────────

/// Single writer of the shared quality level.
#[derive(Debug)]
pub struct LatencyController {
    level: Arc<AtomicU8>,
}

impl LatencyController {
    pub fn new(initial: QualityLevel) -> Self {
        Self {
            level: Arc::new(AtomicU8::new(initial.get())),
        }
    }

    /// Apply one round-trip sample and return the resulting level.
    pub fn observe(&mut self, rtt_ms: f64) -> QualityLevel {
        let next = self.current().step(rtt_ms);
        self.level.store(next.get(), Ordering::Release);
        next
    }

    /// Operator override; may go up to [`HARD_MAX_QUALITY`].
    pub fn set_level(&mut self, level: QualityLevel) {
        self.level.store(level.get(), Ordering::Release);
    }

    pub fn current(&self) -> QualityLevel {
        QualityLevel(self.level.load(Ordering::Acquire))
    }

    /// Read-only handle for the encoding side.
    pub fn reader(&self) -> QualityReader {
        QualityReader {
            level: Arc::clone(&self.level),
        }
    }
}

impl Default for LatencyController {
    fn default() -> Self {
        Self::new(QualityLevel::default())
    }
}

/// Read side of the quality level. Cheap to clone.
#[derive(Debug, Clone)]
pub struct QualityReader {
    level: Arc<AtomicU8>,
}

impl QualityReader {
    pub fn current(&self) -> QualityLevel {
        QualityLevel(self.level.load(Ordering::Acquire))
    }
}

// ── LatencyGauge ─────────────────────────────────────────────────

/// Last measured round trip, for observability only.
///
/// Stores the `f64` bit pattern in an atomic word; NaN means "no sample
/// yet".
#[derive(Debug, Clone)]
pub struct LatencyGauge {
    bits: Arc<AtomicU64>,
}

impl LatencyGauge {
    pub fn new() -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(f64::NAN.to_bits())),
        }
    }

    pub fn record(&self, rtt_ms: f64) {
        self.bits.store(rtt_ms.to_bits(), Ordering::Relaxed);
    }

    /// Most recent round trip in milliseconds, if any.
    pub fn last(&self) -> Option<f64> {
        let value = f64::from_bits(self.bits.load(Ordering::Relaxed));
        (!value.is_nan()).then_some(value)
    }
}

impl Default for LatencyGauge {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_latency_lowers_by_ten() {
        for start in (MIN_QUALITY + 1)..=HARD_MAX_QUALITY {
            let next = QualityLevel::new(start).step(250.0);
            assert_eq!(next.get(), start.saturating_sub(10).max(MIN_QUALITY));
        }
    }

    #[test]
    fn low_latency_raises_to_soft_cap() {
        for start in MIN_QUALITY..SOFT_MAX_QUALITY {
            let next = QualityLevel::new(start).step(50.0);
            assert_eq!(next.get(), (start + 10).min(SOFT_MAX_QUALITY));
        }
    }

    #[test]
    fn hysteresis_band_is_stable() {
        for rtt in [100.0, 120.5, 150.0, 199.9, 200.0] {
            for start in [10, 40, 70, 95] {
                assert_eq!(QualityLevel::new(start).step(rtt).get(), start);
            }
        }
    }

    #[test]
    fn floor_and_soft_cap_hold() {
        assert_eq!(QualityLevel::MIN.step(1_000.0), QualityLevel::MIN);
        assert_eq!(QualityLevel::SOFT_MAX.step(1.0), QualityLevel::SOFT_MAX);
        // Above the soft cap a manual level is left alone by good samples...
        assert_eq!(QualityLevel::HARD_MAX.step(1.0), QualityLevel::HARD_MAX);
        // ...but still drops on bad ones.
        assert_eq!(QualityLevel::HARD_MAX.step(500.0).get(), 85);
    }

    #[test]
    fn construction_clamps() {
        assert_eq!(QualityLevel::new(0).get(), MIN_QUALITY);
        assert_eq!(QualityLevel::new(255).get(), HARD_MAX_QUALITY);
    }

    #[test]
    fn any_sequence_stays_in_range() {
        let mut controller = LatencyController::new(QualityLevel::HARD_MAX);
        let samples = [
            10.0, 900.0, 5.0, f64::NAN, 300.0, 300.0, 300.0, 300.0, 300.0, 300.0, 300.0,
            300.0, 300.0, 300.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 150.0, -3.0,
        ];
        for rtt in samples {
            let level = controller.observe(rtt).get();
            assert!((MIN_QUALITY..=HARD_MAX_QUALITY).contains(&level), "{level}");
        }
    }

    #[test]
    fn pong_sequence_respects_soft_cap() {
        let mut controller = LatencyController::new(QualityLevel::new(70));
        assert_eq!(controller.observe(250.0).get(), 60);
        assert_eq!(controller.observe(50.0).get(), 70);
        assert_eq!(controller.observe(150.0).get(), 70);
    }

    #[test]
    fn reader_sees_writer() {
        let mut controller = LatencyController::default();
        let reader = controller.reader();
        assert_eq!(reader.current().get(), DEFAULT_QUALITY);

        controller.observe(400.0);
        assert_eq!(reader.current().get(), DEFAULT_QUALITY - 10);

        controller.set_level(QualityLevel::HARD_MAX);
        assert_eq!(reader.current(), QualityLevel::HARD_MAX);
    }

    #[test]
    fn gauge_starts_empty() {
        let gauge = LatencyGauge::new();
        assert_eq!(gauge.last(), None);
        gauge.clone().record(42.5);
        assert_eq!(gauge.last(), Some(42.5));
    }
}
