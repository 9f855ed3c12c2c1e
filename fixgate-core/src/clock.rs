/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Clock abstractions.
//!
//! The session state machine uses monotonic time for heartbeat timers and
//! epoch time for `SendingTime` stamps, so the two are exposed as separate
//! readings on one [`Clock`] trait. Production code uses [`SystemClock`];
//! every timer scenario in the test suites is driven through [`FakeClock`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Nanosecond clock with both wall-clock and monotonic readings.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Nanoseconds since the Unix epoch (wall clock).
    fn epoch_nanos(&self) -> u64;

    /// Nanoseconds on a monotonic timeline with an arbitrary origin.
    fn monotonic_nanos(&self) -> u64;
}

/// System clock backed by `SystemTime` and `Instant`.
#[derive(Debug)]
pub struct SystemClock {
    /// Anchor for the monotonic reading.
    origin: Instant,
}

impl SystemClock {
    /// Creates a new system clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn epoch_nanos(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64
    }

    fn monotonic_nanos(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Settable clock for tests.
///
/// Cloning yields a handle onto the same underlying time, so a test can hold
/// one handle and hand another to the code under test.
#[derive(Debug, Clone, Default)]
pub struct FakeClock {
    inner: Arc<FakeClockInner>,
}

#[derive(Debug, Default)]
struct FakeClockInner {
    epoch_nanos: AtomicU64,
    monotonic_nanos: AtomicU64,
}

impl FakeClock {
    /// Creates a fake clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fake clock with the given starting readings.
    #[must_use]
    pub fn at(epoch_nanos: u64, monotonic_nanos: u64) -> Self {
        let clock = Self::new();
        clock.inner.epoch_nanos.store(epoch_nanos, Ordering::SeqCst);
        clock
            .inner
            .monotonic_nanos
            .store(monotonic_nanos, Ordering::SeqCst);
        clock
    }

    /// Advances both readings by the given number of nanoseconds.
    pub fn advance_nanos(&self, nanos: u64) {
        self.inner.epoch_nanos.fetch_add(nanos, Ordering::SeqCst);
        self.inner
            .monotonic_nanos
            .fetch_add(nanos, Ordering::SeqCst);
    }

    /// Advances both readings by the given number of milliseconds.
    pub fn advance_millis(&self, millis: u64) {
        self.advance_nanos(millis * 1_000_000);
    }

    /// Advances both readings by the given number of seconds.
    pub fn advance_seconds(&self, seconds: u64) {
        self.advance_nanos(seconds * 1_000_000_000);
    }

    /// Sets the wall-clock reading.
    pub fn set_epoch_nanos(&self, nanos: u64) {
        self.inner.epoch_nanos.store(nanos, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn epoch_nanos(&self) -> u64 {
        self.inner.epoch_nanos.load(Ordering::SeqCst)
    }

    fn monotonic_nanos(&self) -> u64 {
        self.inner.monotonic_nanos.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_monotonic_advances() {
        let clock = SystemClock::new();
        let a = clock.monotonic_nanos();
        let b = clock.monotonic_nanos();
        assert!(b >= a);
    }

    #[test]
    fn test_system_clock_epoch_nonzero() {
        let clock = SystemClock::new();
        assert!(clock.epoch_nanos() > 0);
    }

    #[test]
    fn test_fake_clock_advance() {
        let clock = FakeClock::new();
        assert_eq!(clock.monotonic_nanos(), 0);

        clock.advance_seconds(30);
        assert_eq!(clock.monotonic_nanos(), 30_000_000_000);
        assert_eq!(clock.epoch_nanos(), 30_000_000_000);

        clock.advance_millis(500);
        assert_eq!(clock.monotonic_nanos(), 30_500_000_000);
    }

    #[test]
    fn test_fake_clock_shared_handles() {
        let clock = FakeClock::new();
        let handle = clock.clone();

        clock.advance_seconds(1);
        assert_eq!(handle.monotonic_nanos(), 1_000_000_000);
    }

    #[test]
    fn test_fake_clock_at() {
        let clock = FakeClock::at(1_000, 2_000);
        assert_eq!(clock.epoch_nanos(), 1_000);
        assert_eq!(clock.monotonic_nanos(), 2_000);
    }
}
