//! Raw Clock - Monotonic Nanoseconds Plus Fast-Forward
//!
//! A thin layer over the OS monotonic clock. Readings are durations since the
//! clock was constructed, shifted by an explicit offset that only ever grows.
//! The offset exists so tests (and cost-model experiments) can move time
//! forward deterministically without sleeping.

use std::time::{Duration, Instant};

/// Wall time as measured by the engine: a nanosecond duration since boot.
///
/// Additive and never negative. All cost arithmetic works on these
/// durations, never on absolute timestamps.
pub type Time = Duration;

/// Monotonic clock with a testable fast-forward offset.
///
/// # Invariant (law T-001)
///
/// `now()` never decreases: the OS monotonic reading never decreases and the
/// forwarded offset only grows.
#[derive(Debug)]
pub struct RawClock {
    /// Instant this clock was constructed; all readings are relative to it.
    boot: Instant,

    /// Accumulated fast-forward offset.
    forwarded: Time,
}

impl RawClock {
    /// Create a clock reading ~zero.
    pub fn new() -> Self {
        Self {
            boot: Instant::now(),
            forwarded: Time::ZERO,
        }
    }

    /// Current reading: `monotonic_now − boot_instant + forwarded_offset`.
    pub fn now(&self) -> Time {
        self.boot.elapsed() + self.forwarded
    }

    /// Advance the clock by `d` without waiting.
    ///
    /// This is the only supported way to perturb time.
    pub fn fast_forward(&mut self, d: Time) {
        self.forwarded += d;
    }
}

impl Default for RawClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_clock_monotonic() {
        let clock = RawClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_fast_forward_shifts_reading() {
        let mut clock = RawClock::new();
        let before = clock.now();
        clock.fast_forward(Duration::from_secs(3600));
        let after = clock.now();
        assert!(after >= before + Duration::from_secs(3600));
    }

    #[test]
    fn test_fast_forward_accumulates() {
        let mut clock = RawClock::new();
        clock.fast_forward(Duration::from_millis(100));
        clock.fast_forward(Duration::from_millis(200));
        assert!(clock.now() >= Duration::from_millis(300));
    }
}
