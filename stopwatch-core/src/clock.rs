//! Time sources.
//!
//! Everything in the stopwatch counts whole milliseconds as `u64`. A clock
//! only needs to be monotonic; the origin is arbitrary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// How often a waiter re-checks a [`ManualClock`].
const MANUAL_POLL: Duration = Duration::from_millis(1);

pub trait Clock: Send + Sync {
    /// Current reading in milliseconds.
    fn now_ms(&self) -> u64;

    /// Real time a waiter should block before looking at `now_ms` again
    /// while it waits for `deadline_ms`.
    fn wait_hint(&self, deadline_ms: u64) -> Duration {
        Duration::from_millis(deadline_ms.saturating_sub(self.now_ms()))
    }
}

/// Wall clock, counted from the moment it was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Clock that only moves when told to. Used to drive the pump
/// deterministically from tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self { now: AtomicU64::new(start_ms) }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Moves the clock to `ms`. Never goes backwards.
    pub fn set(&self, ms: u64) {
        self.now.fetch_max(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn wait_hint(&self, _deadline_ms: u64) -> Duration {
        MANUAL_POLL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock::new();
        let t1 = clock.now_ms();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.now_ms() >= t1 + 5);
    }

    #[test]
    fn test_system_clock_wait_hint() {
        let clock = SystemClock::new();
        assert_eq!(clock.wait_hint(0), Duration::ZERO);
        assert!(clock.wait_hint(10_000) > Duration::from_millis(9_000));
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now_ms(), 100);
        clock.advance(50);
        assert_eq!(clock.now_ms(), 150);
        clock.set(120); // no going back
        assert_eq!(clock.now_ms(), 150);
        clock.set(1000);
        assert_eq!(clock.now_ms(), 1000);
        assert_eq!(clock.wait_hint(5000), MANUAL_POLL);
    }
}
