//! Time source for the limiter.
//!
//! All algorithm arithmetic is done in integer milliseconds since the Unix
//! epoch, so the clock is a port that tests can drive by hand.

use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;

/// Port for obtaining the current time in epoch milliseconds.
pub trait Clock: Send + Sync + Debug {
    fn now_ms(&self) -> u64;
}

/// Wall clock backed by `chrono::Utc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Manually driven clock.
///
/// Clones share the same underlying time, so a test can hand one clone to the
/// limiter and keep another to advance.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    current_ms: Arc<Mutex<u64>>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            current_ms: Arc::new(Mutex::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: u64) {
        *self.current_ms.lock() += ms;
    }

    pub fn set(&self, ms: u64) {
        *self.current_ms.lock() = ms;
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        *self.current_ms.lock()
    }
}
