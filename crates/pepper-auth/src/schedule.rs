//! Time sources and the auto-refresh deadline tracker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Millisecond time source used to arm and fire auto-refresh.
pub trait Clock: Send + Sync {
    /// Returns the current time in epoch milliseconds.
    fn now_ms(&self) -> u64;
}

/// Wall-clock time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(duration_to_ms)
            .unwrap_or(0)
    }
}

/// Deterministic clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Creates a clock frozen at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(duration_to_ms(by), Ordering::SeqCst);
    }

    /// Sets the clock to an absolute time.
    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Periodic deadline for the auto-refresh timer.
///
/// # Semantics
/// A tick at or after the deadline fires once, however many intervals were
/// missed, and moves the deadline to the first interval boundary after that
/// tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSchedule {
    interval_ms: u64,
    next_due_ms: u64,
}

impl RefreshSchedule {
    /// Arms a schedule whose first deadline is one interval after `now_ms`.
    pub fn arm(now_ms: u64, interval: Duration) -> Self {
        let interval_ms = duration_to_ms(interval).max(1);
        Self {
            interval_ms,
            next_due_ms: now_ms.saturating_add(interval_ms),
        }
    }

    /// Interval between refreshes in milliseconds.
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Next deadline in epoch milliseconds.
    pub fn next_due_ms(&self) -> u64 {
        self.next_due_ms
    }

    /// Returns `true` and advances the deadline when `now_ms` has reached it.
    pub fn fire_if_due(&mut self, now_ms: u64) -> bool {
        if now_ms < self.next_due_ms {
            return false;
        }

        let missed = (now_ms - self.next_due_ms) / self.interval_ms + 1;
        self.next_due_ms = self
            .next_due_ms
            .saturating_add(missed.saturating_mul(self.interval_ms));
        true
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
