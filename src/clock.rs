//! Monotonic time sources
//!
//! All timestamps in the system are seconds as `f64`. The input system only
//! ever asks its clock for `now()`; it never sleeps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of the current time in seconds
pub trait Clock: Send {
    fn now(&self) -> f64;
}

/// Wall clock, seconds since construction
#[derive(Debug, Clone)]
pub struct SystemClock {
    start_instant: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start_instant: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.start_instant.elapsed().as_secs_f64()
    }
}

/// Manually driven clock
///
/// Clones share the same time, so a test can keep one handle and give the
/// other to the input system.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now_bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, seconds: f64) {
        self.now_bits.store(seconds.to_bits(), Ordering::Relaxed);
    }

    /// Move forward by `seconds`
    pub fn advance(&self, seconds: f64) {
        let now = self.now();
        self.set(now + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.now_bits.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(10.0);
        let handle = clock.clone();

        handle.advance(0.25);
        assert_eq!(clock.now(), 10.25);

        clock.set(3.0);
        assert_eq!(handle.now(), 3.0);
    }

    #[test]
    fn test_default_manual_clock_starts_at_zero() {
        assert_eq!(ManualClock::default().now(), 0.0);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
