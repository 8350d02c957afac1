//! Tick source for the pacer.
//!
//! The pacer never reads system time itself. It is handed a `Clock` that
//! exposes a monotonic tick counter and the counter's frequency, which keeps
//! every time-dependent decision reproducible under a `ManualClock`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Nanoseconds per second.
pub const NSEC_PER_SEC: u64 = 1_000_000_000;

/// A monotonic tick counter with a known frequency.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current tick. Never decreases.
    fn ticks(&self) -> u64;

    /// Returns the number of ticks per second.
    fn ticks_hz(&self) -> u64;
}

/// Converts nanoseconds to ticks at the given frequency, saturating at `u64::MAX`.
#[must_use]
pub fn ns_to_ticks(ns: u64, ticks_hz: u64) -> u64 {
    // u128 keeps `ns * hz` from overflowing for long periods on fast counters.
    u64::try_from(u128::from(ns) * u128::from(ticks_hz) / u128::from(NSEC_PER_SEC))
        .unwrap_or(u64::MAX)
}

/// Converts ticks to nanoseconds at the given frequency, saturating at `u64::MAX`.
///
/// A zero frequency is treated as one tick per second.
#[must_use]
pub fn ticks_to_ns(ticks: u64, ticks_hz: u64) -> u64 {
    u64::try_from(u128::from(ticks) * u128::from(NSEC_PER_SEC) / u128::from(ticks_hz.max(1)))
        .unwrap_or(u64::MAX)
}

/// Clock backed by `Instant`, ticking once per nanosecond.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose tick zero is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn ticks(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn ticks_hz(&self) -> u64 {
        NSEC_PER_SEC
    }
}

/// Clock that only moves when told to.
///
/// Used for deterministic simulation: tests advance it explicitly between
/// polls. Shared through an `Arc` so the test and the pacer see the same counter.
#[derive(Debug)]
pub struct ManualClock {
    ticks: AtomicU64,
    ticks_hz: u64,
}

impl ManualClock {
    /// Creates a clock at tick zero with the given frequency.
    #[must_use]
    pub const fn new(ticks_hz: u64) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            ticks_hz,
        }
    }

    /// Creates a nanosecond-resolution clock, convenient for tests.
    #[must_use]
    pub const fn nanos() -> Self {
        Self::new(NSEC_PER_SEC)
    }

    /// Advances the clock by `ticks`.
    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::Release);
    }

    /// Advances the clock by `ns` nanoseconds worth of ticks.
    pub fn advance_ns(&self, ns: u64) {
        self.advance(ns_to_ticks(ns, self.ticks_hz));
    }
}

impl Clock for ManualClock {
    fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    fn ticks_hz(&self) -> u64 {
        self.ticks_hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ns_to_ticks() {
        assert_eq!(ns_to_ticks(1_000, NSEC_PER_SEC), 1_000);
        // 2.5 GHz TSC.
        assert_eq!(ns_to_ticks(1_000, 2_500_000_000), 2_500);
        // Sub-tick periods round down.
        assert_eq!(ns_to_ticks(999, 1_000_000), 0);
    }

    #[test]
    fn test_ticks_to_ns() {
        assert_eq!(ticks_to_ns(2_500, 2_500_000_000), 1_000);
        assert_eq!(ticks_to_ns(1, 1_000_000), 1_000);
        // Zero frequency doesn't divide by zero.
        assert_eq!(ticks_to_ns(3, 0), 3 * NSEC_PER_SEC);
    }

    #[test]
    fn test_conversion_does_not_overflow() {
        // A u32::MAX period on a 3 GHz counter overflows 64-bit math.
        let ticks = ns_to_ticks(u64::from(u32::MAX), 3_000_000_000);
        assert_eq!(ticks, 12_884_901_885);
        assert_eq!(ns_to_ticks(u64::MAX, u64::MAX), u64::MAX);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(1_000_000);
        assert_eq!(clock.ticks(), 0);

        clock.advance(10);
        assert_eq!(clock.ticks(), 10);

        // 5 us at 1 MHz = 5 ticks.
        clock.advance_ns(5_000);
        assert_eq!(clock.ticks(), 15);
        assert_eq!(clock.ticks_hz(), 1_000_000);
    }

    #[test]
    fn test_monotonic_clock_is_monotonic() {
        let clock = MonotonicClock::new();
        let a = clock.ticks();
        let b = clock.ticks();
        assert!(b >= a);
        assert_eq!(clock.ticks_hz(), NSEC_PER_SEC);
    }
}
