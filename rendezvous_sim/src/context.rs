//! Seeded context implementing SyncContext for reproducible harness runs.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rendezvous_env::{CancelToken, Cancelled, EnvError, RunId, SyncContext};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Context backed by a seeded RNG and a scaled clock.
///
/// This implements `SyncContext` using:
/// - A ChaCha8 RNG seeded from one 64-bit seed, so every jitter and choice
///   is drawn from the same stream for a given seed
/// - A time scale: with scale `s`, every pause lasts `1/s` of its nominal
///   length and `now()` reports nominal time
///
/// Thread interleavings are still up to the OS scheduler; the seed fixes
/// the random draws, not the order threads make them in.
pub struct SeededContext {
    /// Master seed for this run
    seed: u64,

    /// Nominal time per real time
    time_scale: f64,

    /// Real start instant
    start: Instant,

    /// Shared draw stream
    rng: Mutex<ChaCha8Rng>,

    /// Strategy runs started on this context so far
    runs: AtomicU64,
}

impl SeededContext {
    /// Creates a real-time context with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            time_scale: 1.0,
            start: Instant::now(),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            runs: AtomicU64::new(0),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Runs pauses `scale` times faster than nominal.
    pub fn with_time_scale(mut self, scale: f64) -> Result<Self, EnvError> {
        self.time_scale = EnvError::check_time_scale(scale)?;
        Ok(self)
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    fn draw<T>(&self, f: impl FnOnce(&mut ChaCha8Rng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }
}

/// Multiplies a duration, saturating instead of overflowing.
fn scaled(d: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(d.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

impl SyncContext for SeededContext {
    fn now(&self) -> Duration {
        scaled(self.start.elapsed(), self.time_scale)
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<(), Cancelled> {
        cancel.sleep(scaled(duration, self.time_scale.recip()))
    }

    fn jitter(&self, base: Duration, spread: f64) -> Duration {
        let spread = spread.clamp(0.0, 1.0);
        if spread == 0.0 {
            return base;
        }
        let factor = self.draw(|rng| rng.gen_range(1.0 - spread..=1.0 + spread));
        scaled(base, factor)
    }

    fn pick(&self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        self.draw(|rng| rng.gen_range(0..n))
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    /// The first run gets `RunId::from_seed(seed)`; later runs mix in
    /// their ordinal.
    fn next_run_id(&self) -> RunId {
        let run = self.runs.fetch_add(1, Ordering::Relaxed);
        RunId::from_seed(self.seed ^ run.wrapping_mul(0x9e37_79b9_7f4a_7c15))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_seeded_context_is_reproducible() {
        let a = SeededContext::new(42);
        let b = SeededContext::new(42);
        let draws_a: Vec<usize> = (0..32).map(|_| a.pick(1000)).collect();
        let draws_b: Vec<usize> = (0..32).map(|_| b.pick(1000)).collect();
        assert_eq!(draws_a, draws_b);

        let c = SeededContext::new(43);
        let draws_c: Vec<usize> = (0..32).map(|_| c.pick(1000)).collect();
        assert_ne!(draws_a, draws_c);
    }

    #[test]
    fn test_extreme_scales_saturate() {
        let ctx = SeededContext::new(1).with_time_scale(f64::MIN_POSITIVE).unwrap();
        assert_eq!(scaled(Duration::from_secs(60), ctx.time_scale().recip()), Duration::MAX);
        assert_eq!(scaled(Duration::MAX, 2.0), Duration::MAX);

        let fast = SeededContext::new(1).with_time_scale(f64::MAX).unwrap();
        std::thread::sleep(Duration::from_millis(1));
        assert_eq!(fast.now(), Duration::MAX);
    }

    #[test]
    fn test_seeded_context_seed() {
        assert_eq!(SeededContext::new(12345).seed(), 12345);
    }

    #[test]
    fn test_time_scale_shortens_sleep() {
        let ctx = SeededContext::new(1).with_time_scale(10.0).unwrap();
        let cancel = CancelToken::new();
        let started = Instant::now();
        ctx.sleep(Duration::from_millis(200), &cancel).unwrap();
        assert!(started.elapsed() < Duration::from_millis(150));
        assert!(ctx.now() >= Duration::from_millis(200));
    }

    #[test]
    fn test_run_ids_follow_the_seed() {
        let a = SeededContext::new(9);
        let b = SeededContext::new(9);
        let first = a.next_run_id();
        assert_eq!(first, RunId::from_seed(9));
        assert_eq!(first, b.next_run_id());
        assert_ne!(a.next_run_id(), first);
    }

    #[test]
    fn test_rejects_bad_time_scale() {
        assert!(SeededContext::new(1).with_time_scale(0.0).is_err());
        assert!(SeededContext::new(1).with_time_scale(f64::NAN).is_err());
    }

    proptest! {
        #[test]
        fn prop_jitter_stays_in_bounds(seed in any::<u64>(), base_ms in 0u64..1000, spread in 0.0f64..=1.0) {
            let ctx = SeededContext::new(seed);
            let base = Duration::from_millis(base_ms);
            let d = ctx.jitter(base, spread);
            prop_assert!(d >= base.mul_f64(1.0 - spread).saturating_sub(Duration::from_micros(1)));
            prop_assert!(d <= base.mul_f64(1.0 + spread) + Duration::from_micros(1));
        }

        #[test]
        fn prop_pick_in_range(seed in any::<u64>(), n in 1usize..500) {
            let ctx = SeededContext::new(seed);
            prop_assert!(ctx.pick(n) < n);
        }
    }
}
