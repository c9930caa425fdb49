//! Wall-clock implementation of SyncContext.

use crate::cancel::{CancelToken, Cancelled};
use crate::SyncContext;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Context backed by the system clock and thread-local entropy.
///
/// This is the "live" implementation used when a learner watches a run.
/// Time comes from [`Instant`], randomness from `rand::thread_rng`.
pub struct SystemContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl SystemContext {
    /// Creates a new SystemContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across workers.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for SystemContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncContext for SystemContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<(), Cancelled> {
        cancel.sleep(duration)
    }

    fn jitter(&self, base: Duration, spread: f64) -> Duration {
        let spread = spread.clamp(0.0, 1.0);
        if spread == 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range(1.0 - spread..=1.0 + spread);
        Duration::try_from_secs_f64(base.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }

    fn pick(&self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..n)
    }

    fn seed(&self) -> u64 {
        // The system context is not seeded
        0
    }
}
