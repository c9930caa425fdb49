//! Core environment context trait for strategy workers.

use crate::cancel::{CancelToken, Cancelled};
use crate::types::RunId;
use std::time::Duration;

/// The central interface for environment interaction.
///
/// This trait abstracts the clock and the source of randomness so that the
/// engine can run against real time (the learner watching a live run) or a
/// seeded, time-scaled environment (the scenario harness).
///
/// # Implementations
///
/// - **System**: [`SystemContext`](crate::SystemContext) - wall clock, thread RNG
/// - **Seeded**: `SeededContext` in `rendezvous_sim` - ChaCha8 RNG, scaled time
///
/// The trait is object safe; strategies hold an `Arc<dyn SyncContext>`.
pub trait SyncContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    fn now(&self) -> Duration;

    /// Suspends the calling thread for `duration`.
    ///
    /// Returns `Err(Cancelled)` as soon as `cancel` trips; the token is
    /// re-checked at least every [`WAIT_SLICE`](crate::WAIT_SLICE).
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<(), Cancelled>;

    /// Returns `base` scaled by a random factor in `[1 - spread, 1 + spread]`.
    ///
    /// `spread` is clamped to `[0, 1]`, so the result is always bounded by
    /// `2 * base`.
    fn jitter(&self, base: Duration, spread: f64) -> Duration;

    /// Returns a uniformly chosen index in `0..n` (`0` when `n == 0`).
    fn pick(&self, n: usize) -> usize;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// The system context is not seeded and returns 0.
    fn seed(&self) -> u64;

    /// Returns the id for the next strategy run started on this context.
    ///
    /// Random by default; seeded contexts derive it from the seed so a
    /// harness run can be found again by seed.
    fn next_run_id(&self) -> RunId {
        RunId::new()
    }
}
