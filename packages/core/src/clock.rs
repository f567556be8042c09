//! Injectable clock abstraction.
//!
//! Every time-dependent decision in the storage core — message expiry, claim
//! expiry, id minting — reads "now" through a [`ClockSource`] rather than
//! calling `SystemTime::now()` directly, so tests can swap in a deterministic
//! clock instead of sleeping real seconds.

use std::time::{SystemTime, UNIX_EPOCH};

/// Abstraction over the wall clock for dependency injection.
///
/// The default implementation ([`SystemClock`]) delegates to
/// `std::time::SystemTime`. Tests use a fixed or steppable clock instead.
pub trait ClockSource: Send + Sync {
    /// Returns the current time as seconds since the Unix epoch.
    fn now_secs(&self) -> u64;
}

/// Default clock source that reads the real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before Unix epoch")
            .as_secs()
    }
}

/// A clock whose value is set explicitly, for deterministic tests of
/// TTL/claim-expiry logic that would otherwise require sleeping real time.
#[derive(Debug, Clone)]
pub struct ManualClock(std::sync::Arc<std::sync::atomic::AtomicU64>);

impl ManualClock {
    /// Creates a manual clock starting at `initial_secs`.
    #[must_use]
    pub fn new(initial_secs: u64) -> Self {
        Self(std::sync::Arc::new(std::sync::atomic::AtomicU64::new(
            initial_secs,
        )))
    }

    /// Advances the clock by `secs` seconds.
    pub fn advance(&self, secs: u64) {
        self.0
            .fetch_add(secs, std::sync::atomic::Ordering::Relaxed);
    }

    /// Sets the clock to an absolute value.
    pub fn set(&self, secs: u64) {
        self.0.store(secs, std::sync::atomic::Ordering::Relaxed);
    }
}

impl ClockSource for ManualClock {
    fn now_secs(&self) -> u64 {
        self.0.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_returns_nonzero() {
        assert!(SystemClock.now_secs() > 0);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now_secs(), 100);
        clock.advance(5);
        assert_eq!(clock.now_secs(), 105);
        clock.set(0);
        assert_eq!(clock.now_secs(), 0);
    }
}
