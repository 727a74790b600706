//! Monotonic time sources
//!
//! The polling loop and the playback scheduler never read the wall clock
//! directly. They go through [`Clock`] so that tests can drive time by hand
//! with a [`VirtualClock`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Waits longer than this are slept (minus one millisecond of margin);
/// shorter ones spin with `yield_now`.
const SPIN_THRESHOLD: Duration = Duration::from_millis(2);

/// Monotonic clock with microsecond resolution
pub trait Clock: Send + Sync {
    /// Microseconds since the clock's origin
    fn now_micros(&self) -> u64;

    /// Milliseconds since the clock's origin
    fn now_millis(&self) -> u64 {
        self.now_micros() / 1000
    }

    /// Give the thread away briefly while a deadline `remaining` ahead is awaited.
    ///
    /// Must return no later than the deadline; callers re-check the time.
    fn pause(&self, remaining: Duration);

    /// Block for `duration` (loop pacing, device settle delays)
    fn sleep(&self, duration: Duration);
}

/// Real monotonic clock backed by [`Instant`]
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
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
    fn now_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    fn pause(&self, remaining: Duration) {
        if remaining > SPIN_THRESHOLD {
            std::thread::sleep(remaining - Duration::from_millis(1));
        } else {
            std::thread::yield_now();
        }
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Manually driven clock
///
/// Clones share the same time. `pause` and `sleep` advance time instead of
/// blocking, so a busy-wait on this clock completes immediately and lands
/// exactly on its deadline.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    now_micros: Arc<AtomicU64>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward
    pub fn advance(&self, duration: Duration) {
        self.now_micros
            .fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
    }

    /// Move time forward by whole milliseconds
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }
}

impl Clock for VirtualClock {
    fn now_micros(&self) -> u64 {
        self.now_micros.load(Ordering::SeqCst)
    }

    fn pause(&self, remaining: Duration) {
        self.advance(remaining);
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
