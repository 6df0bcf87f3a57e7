//! Time source abstraction
//!
//! Engines never read the wall clock directly so lab timing can be driven by tests.

use chrono::Utc;
use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Unix epoch milliseconds
pub type Timestamp = i64;

/// Source of the current time
pub trait Clock: Send + Sync + Debug {
    /// Current time in epoch milliseconds
    fn now_ms(&self) -> Timestamp;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_ms(&self) -> Timestamp {
        Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock, shared by clones
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create clock frozen at `start`
    #[inline]
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    /// Move the clock forward
    #[inline]
    pub fn advance_ms(&self, delta: i64) {
        self.now.fetch_add(delta, Ordering::SeqCst);
    }

    /// Move the clock forward by whole seconds
    #[inline]
    pub fn advance_secs(&self, secs: i64) {
        self.advance_ms(secs * 1000);
    }

    /// Jump to an absolute time
    #[inline]
    pub fn set(&self, at: Timestamp) {
        self.now.store(at, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_ms(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
