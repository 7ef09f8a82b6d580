//! # Time Sources
//!
//! Timelocks are absolute Unix timestamps in seconds. The engine reads the
//! clock exactly once per guard evaluation through [`TimeSource`], so tests
//! can pin time with [`ManualClock`] instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unix time in whole seconds.
pub type Timestamp = u64;

/// A monotonically non-decreasing clock.
pub trait TimeSource: Send + Sync {
    /// Current Unix time in seconds.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time from the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Timestamp {
        // Pre-epoch host clocks read as zero rather than wrapping.
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// A clock that only moves when told to.
///
/// `set` refuses to move backwards so the non-decreasing contract of
/// [`TimeSource`] holds even in tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Start the clock at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Advance by `secs` seconds.
    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    /// Jump to `to` if it is not in the past. Returns the resulting time.
    pub fn set(&self, to: Timestamp) -> Timestamp {
        self.now.fetch_max(to, Ordering::SeqCst).max(to)
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
