//! # Cancellable synchronization primitives.
//!
//! The standard library's blocking calls cannot be interrupted, so a worker
//! parked in `Condvar::wait` or `Barrier::wait` would keep `stop()` waiting
//! forever. Every primitive here waits in [`WAIT_SLICE`] steps and gives up
//! with [`Cancelled`] once the caller's token trips.
//!
//! | Primitive     | Blocks? | Fair? | Used by                                   |
//! |---------------|---------|-------|-------------------------------------------|
//! | [`Lock`]      | Yes     | FIFO  | busy-wait strategies, count guards        |
//! | [`Semaphore`] | Yes     | FIFO  | semaphore strategies, forks, turnstiles   |
//! | [`Monitor`]   | Briefly | No    | monitor strategies, with [`Condition`]s   |
//! | [`Barrier`]   | Yes     | n/a   | forced-barrier and deadlock strategies    |
//!
//! Acquisitions hand out RAII guards, so a permit or lock is released on
//! every exit path, including an early `?` on cancellation. Releases happen
//! in reverse acquisition order when guards are declared in acquisition
//! order.
//!
//! Each primitive implements [`Primitive`] so a strategy can prove at
//! `stop()` that nothing is still held or waited on.
//!
//! [`WAIT_SLICE`]: rendezvous_env::WAIT_SLICE
//! [`Cancelled`]: rendezvous_env::Cancelled

mod barrier;
mod lock;
mod monitor;
mod semaphore;

pub use barrier::{Barrier, BarrierWaitResult};
pub use lock::{Lock, LockGuard};
pub use monitor::{Condition, Monitor, MonitorGuard};
pub use semaphore::{OwnedPermit, Permit, Semaphore};

use rendezvous_env::WAIT_SLICE;
use serde::Serialize;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Introspection shared by every primitive.
pub trait Primitive: Send + Sync {
    /// Human-readable name (e.g. `"fork[3]"`).
    fn name(&self) -> &str;

    /// Permits or locks currently held through guards.
    fn held(&self) -> usize;

    /// Threads currently parked in this primitive.
    fn waiting(&self) -> usize;

    /// Wakeups issued so far (conditions only).
    fn signals(&self) -> u64 {
        0
    }

    /// True when nothing is held and nobody waits.
    fn is_quiescent(&self) -> bool {
        self.held() == 0 && self.waiting() == 0
    }
}

/// Snapshot of a primitive taken at teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrimitiveStatus {
    pub name: String,
    pub held: usize,
    pub waiting: usize,
    pub signals: u64,
}

impl PrimitiveStatus {
    /// Captures the current counters of `primitive`.
    pub fn of(primitive: &dyn Primitive) -> Self {
        Self {
            name: primitive.name().to_string(),
            held: primitive.held(),
            waiting: primitive.waiting(),
            signals: primitive.signals(),
        }
    }

    pub fn is_quiescent(&self) -> bool {
        self.held == 0 && self.waiting == 0
    }
}

/// Locks a std mutex, recovering the data if a previous holder panicked.
///
/// Internal state guarded this way is only ever counters, which stay
/// meaningful after a panic elsewhere.
pub(crate) fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-thread count of locks, permits and monitors held through guards.
///
/// Test builds only. Lets a listener check what the emitting worker still
/// holds when a notice arrives.
#[cfg(test)]
pub(crate) mod held_here {
    use std::cell::Cell;

    thread_local! {
        static HELD: Cell<usize> = const { Cell::new(0) };
    }

    pub(crate) fn acquired() {
        HELD.with(|held| held.set(held.get() + 1));
    }

    pub(crate) fn released() {
        HELD.with(|held| held.set(held.get().saturating_sub(1)));
    }

    pub(crate) fn count() -> usize {
        HELD.with(Cell::get)
    }

    /// Counts as held from creation until dropped.
    pub(crate) struct Entry;

    impl Entry {
        pub(crate) fn new() -> Self {
            acquired();
            Entry
        }
    }

    impl Drop for Entry {
        fn drop(&mut self) {
            released();
        }
    }
}

/// Waits on `cv` for at most one slice.
pub(crate) fn wait_slice<'a, T>(cv: &Condvar, held: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    match cv.wait_timeout(held, WAIT_SLICE) {
        Ok((held, _)) => held,
        Err(poisoned) => poisoned.into_inner().0,
    }
}
