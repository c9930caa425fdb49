//! Cooperative cancellation shared by every worker of a strategy run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on how long any blocking wait goes without re-checking its
/// [`CancelToken`].
///
/// `stop()` on a strategy therefore returns within one slice of the slowest
/// blocked worker noticing the token.
pub const WAIT_SLICE: Duration = Duration::from_millis(5);

/// Marker returned by a blocking call that gave up because its run was
/// stopped.
///
/// Cancellation is a normal lifecycle event, not a failure: workers catch it
/// at the loop boundary and exit after releasing what they hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Shared run flag.
///
/// Clones observe the same flag. A token that is never cancelled is a valid
/// way to make an uninterruptible wait (used on release paths, where the
/// awaited holder is itself bounded).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh, untripped token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the token. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`cancel`](Self::cancel) has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns `Err(Cancelled)` if the token has tripped.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleeps for `duration` in [`WAIT_SLICE`] steps, giving up early once
    /// the token trips.
    pub fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        // No deadline means the sleep only ends on cancellation
        let deadline = Instant::now().checked_add(duration);
        loop {
            self.check()?;
            let left = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => WAIT_SLICE,
            };
            if left.is_zero() {
                return Ok(());
            }
            std::thread::sleep(left.min(WAIT_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endless_sleep_ends_on_cancel() {
        let token = CancelToken::new();
        let other = token.clone();
        let sleeper = std::thread::spawn(move || other.sleep(Duration::MAX));
        std::thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert_eq!(sleeper.join().unwrap(), Err(Cancelled));
    }

    #[test]
    fn test_clones_share_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());

        other.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(Cancelled));
    }

    #[test]
    fn test_sleep_returns_early_when_cancelled() {
        let token = CancelToken::new();
        let remote = token.clone();
        let started = Instant::now();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });

        assert_eq!(token.sleep(Duration::from_secs(10)), Err(Cancelled));
        assert!(started.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }

    #[test]
    fn test_sleep_completes_when_untouched() {
        let token = CancelToken::new();
        let started = Instant::now();
        assert!(token.sleep(Duration::from_millis(12)).is_ok());
        assert!(started.elapsed() >= Duration::from_millis(12));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }
}
