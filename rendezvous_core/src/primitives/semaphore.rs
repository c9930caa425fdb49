//! Counting semaphore with FIFO admission.

use super::{guard, wait_slice, Primitive};
use rendezvous_env::{CancelToken, Cancelled};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

/// Counting semaphore.
///
/// A semaphore maintains a set of permits. [`acquire`](Self::acquire) hands
/// out a [`Permit`] guard that returns the permit when dropped;
/// [`wait`](Self::wait) and [`signal`](Self::signal) are the raw P/V
/// operations for event signaling, where the permit is not owned by the
/// thread that took it.
///
/// Waiters are admitted strictly in arrival order: a later arrival never
/// overtakes an earlier one even when it happens to wake first.
pub struct Semaphore {
    name: String,
    state: Mutex<Permits>,
    released: Condvar,
}

struct Permits {
    available: usize,
    held: usize,
    queue: VecDeque<u64>,
    next_ticket: u64,
}

impl Permits {
    fn leave_queue(&mut self, ticket: u64) {
        if let Some(pos) = self.queue.iter().position(|t| *t == ticket) {
            self.queue.remove(pos);
        }
    }
}

impl Semaphore {
    /// Creates a FIFO-fair semaphore with `permits` initial permits.
    pub fn new(name: impl Into<String>, permits: usize) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(Permits {
                available: permits,
                held: 0,
                queue: VecDeque::new(),
                next_ticket: 0,
            }),
            released: Condvar::new(),
        }
    }

    /// Waits until a permit is available and takes it as a scoped guard.
    pub fn acquire(&self, cancel: &CancelToken) -> Result<Permit<'_>, Cancelled> {
        self.take(cancel, true)?;
        Ok(Permit::new(self))
    }

    /// Like [`acquire`](Self::acquire), but the guard keeps the semaphore
    /// alive and can be stored beyond the caller's scope (e.g. a gate held by
    /// a group of readers).
    pub fn acquire_owned(self: &Arc<Self>, cancel: &CancelToken) -> Result<OwnedPermit, Cancelled> {
        self.take(cancel, true)?;
        Ok(OwnedPermit {
            sema: Some(Arc::clone(self)),
        })
    }

    /// Takes a permit if one is free and nobody is queued.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut state = guard(&self.state);
        if state.available > 0 && state.queue.is_empty() {
            state.available -= 1;
            state.held += 1;
            drop(state);
            Some(Permit::new(self))
        } else {
            None
        }
    }

    /// P(): waits for a permit and consumes it.
    pub fn wait(&self, cancel: &CancelToken) -> Result<(), Cancelled> {
        self.take(cancel, false)
    }

    /// V(): adds a permit and wakes waiters.
    pub fn signal(&self) {
        let mut state = guard(&self.state);
        state.available += 1;
        drop(state);
        self.released.notify_all();
    }

    /// Permits currently available.
    pub fn available(&self) -> usize {
        guard(&self.state).available
    }

    fn take(&self, cancel: &CancelToken, owned: bool) -> Result<(), Cancelled> {
        let mut state = guard(&self.state);
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(ticket);

        loop {
            let our_turn = state.queue.front() == Some(&ticket);
            if state.available > 0 && our_turn {
                state.leave_queue(ticket);
                state.available -= 1;
                if owned {
                    state.held += 1;
                }
                let more = state.available > 0 && !state.queue.is_empty();
                drop(state);
                if more {
                    // The next ticket may be able to proceed as well
                    self.released.notify_all();
                }
                return Ok(());
            }
            if cancel.is_cancelled() {
                state.leave_queue(ticket);
                drop(state);
                self.released.notify_all();
                return Err(Cancelled);
            }
            state = wait_slice(&self.released, state);
        }
    }

    fn give_back(&self) {
        let mut state = guard(&self.state);
        state.held = state.held.saturating_sub(1);
        state.available += 1;
        drop(state);
        self.released.notify_all();
    }

    fn consume_held(&self) {
        let mut state = guard(&self.state);
        state.held = state.held.saturating_sub(1);
    }
}

impl Primitive for Semaphore {
    fn name(&self) -> &str {
        &self.name
    }

    fn held(&self) -> usize {
        guard(&self.state).held
    }

    fn waiting(&self) -> usize {
        guard(&self.state).queue.len()
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = guard(&self.state);
        f.debug_struct("Semaphore")
            .field("name", &self.name)
            .field("available", &state.available)
            .field("held", &state.held)
            .field("waiting", &state.queue.len())
            .finish()
    }
}

/// An RAII permit. Dropping it signals the semaphore.
///
/// Created by [`Semaphore::acquire`].
#[must_use = "dropping a permit releases it immediately"]
pub struct Permit<'a> {
    sema: Option<&'a Semaphore>,
}

impl<'a> Permit<'a> {
    fn new(sema: &'a Semaphore) -> Self {
        #[cfg(test)]
        super::held_here::acquired();
        Self { sema: Some(sema) }
    }

    /// Keeps the permit taken for good instead of returning it.
    ///
    /// Used when a permit is transferred to another semaphore, like a
    /// producer turning an "empty slot" into a "full slot".
    pub fn consume(mut self) {
        if let Some(sema) = self.sema.take() {
            sema.consume_held();
            #[cfg(test)]
            super::held_here::released();
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if let Some(sema) = self.sema.take() {
            sema.give_back();
            #[cfg(test)]
            super::held_here::released();
        }
    }
}

/// An RAII permit that owns a handle to its semaphore.
///
/// Created by [`Semaphore::acquire_owned`].
#[must_use = "dropping a permit releases it immediately"]
pub struct OwnedPermit {
    sema: Option<Arc<Semaphore>>,
}

impl Drop for OwnedPermit {
    fn drop(&mut self) {
        if let Some(sema) = self.sema.take() {
            sema.give_back();
        }
    }
}
