//! The six coordination problems.
//!
//! Each problem module has the same shape:
//!
//! - `model.rs`: the shared resource model (plain counters, ownership
//!   arrays) and the scoped guards that mutate it,
//! - `protocols.rs`: one [`Protocol`](crate::strategy::Protocol) per
//!   supported discipline,
//! - `mod.rs`: the problem's notification enum and `strategy()`, which maps a
//!   discipline to a runnable strategy.
//!
//! Models never block and never decide anything: they only record what the
//! strategies do and count any state a correct strategy could not produce.

pub mod assistants;
pub mod barber;
pub mod buffer;
pub mod dining;
pub mod readers_writers;
pub mod smokers;

#[cfg(test)]
pub(crate) mod testkit;

use crate::actor::{Actor, ActorState, Roster};
use crate::instrument::Port;
use crate::primitives::{Lock, LockGuard, OwnedPermit, Semaphore};
use crate::strategy::{Flow, Session};
use rendezvous_env::{ActorId, Cancelled};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared state of one problem, as seen by the controller and observers.
pub trait ResourceModel: Send + Sync {
    /// Live actors of the problem.
    fn roster(&self) -> &Roster;

    /// Restores the initial state and empties the roster.
    fn reset(&self);

    /// States a correct strategy could not have produced.
    fn violations(&self) -> u64;

    /// Completed uses so far (items moved, meals, haircuts, ...).
    fn progress(&self) -> u64;
}

/// Invariant violation counter.
#[derive(Debug, Default)]
pub struct Violations {
    count: AtomicU64,
}

impl Violations {
    pub(crate) fn record(&self, model: &'static str, what: &str) {
        self.count.fetch_add(1, Ordering::SeqCst);
        tracing::error!(model, what, "invariant violated");
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }
}

const VACANT: u64 = 0;

/// Owner slots for exclusive resources (forks, seats, the chair,
/// assistants). Each slot holds the owning actor's id or nothing.
#[derive(Debug)]
pub struct Ownership {
    model: &'static str,
    owners: Vec<AtomicU64>,
    conflicts: AtomicU64,
}

impl Ownership {
    pub fn new(model: &'static str, slots: usize) -> Self {
        Self {
            model,
            owners: (0..slots).map(|_| AtomicU64::new(VACANT)).collect(),
            conflicts: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn owner(&self, index: usize) -> Option<ActorId> {
        match self.owners.get(index)?.load(Ordering::SeqCst) {
            VACANT => None,
            id => Some(ActorId(id)),
        }
    }

    pub fn is_free(&self, index: usize) -> bool {
        self.owner(index).is_none()
    }

    /// Slots currently owned.
    pub fn occupied(&self) -> usize {
        self.owners
            .iter()
            .filter(|o| o.load(Ordering::SeqCst) != VACANT)
            .count()
    }

    pub fn owners(&self) -> Vec<Option<ActorId>> {
        (0..self.len()).map(|i| self.owner(i)).collect()
    }

    /// Takes slot `index` for `owner`. The strategy must already have made
    /// sure the slot is free; a taken slot is counted as a conflict and the
    /// returned claim is empty.
    pub(crate) fn claim(&self, index: usize, owner: ActorId) -> Claim<'_> {
        let taken = self
            .owners
            .get(index)
            .map(|slot| {
                slot.compare_exchange(VACANT, owner.get(), Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            })
            .unwrap_or(false);
        if !taken {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
            tracing::error!(model = self.model, index, %owner, holder = ?self.owner(index), "double ownership");
        }
        Claim {
            slots: self,
            index,
            owner,
            granted: taken,
        }
    }

    /// Takes the first free slot, if any. Finding none is not a conflict.
    pub(crate) fn claim_any(&self, owner: ActorId) -> Option<Claim<'_>> {
        self.owners.iter().enumerate().find_map(|(index, slot)| {
            slot.compare_exchange(VACANT, owner.get(), Ordering::SeqCst, Ordering::SeqCst)
                .ok()
                .map(|_| Claim {
                    slots: self,
                    index,
                    owner,
                    granted: true,
                })
        })
    }

    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        for slot in &self.owners {
            slot.store(VACANT, Ordering::SeqCst);
        }
        self.conflicts.store(0, Ordering::SeqCst);
    }
}

/// Ownership of one slot; vacates it when dropped.
#[must_use = "dropping a claim vacates the slot"]
pub struct Claim<'a> {
    slots: &'a Ownership,
    index: usize,
    owner: ActorId,
    granted: bool,
}

impl Claim<'_> {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.granted {
            return;
        }
        if let Some(slot) = self.slots.owners.get(self.index) {
            let _ = slot.compare_exchange(self.owner.get(), VACANT, Ordering::SeqCst, Ordering::SeqCst);
        }
    }
}

/// What a protocol is built from: the model it coordinates and the port it
/// reports to.
pub(crate) struct Stage<M, P> {
    pub model: Arc<M>,
    pub port: Port<P>,
}

impl<M, P> Clone for Stage<M, P> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
            port: self.port.clone(),
        }
    }
}

/// Busy-waits for `ready`: takes the lock, tests, and on failure releases it
/// and backs off before trying again.
pub(crate) fn spin_until<'a, T>(
    lock: &'a Lock<T>,
    session: &Session,
    mut ready: impl FnMut(&mut T) -> bool,
) -> Result<LockGuard<'a, T>, Cancelled> {
    loop {
        let mut held = lock.lock(session.cancel())?;
        if ready(&mut held) {
            return Ok(held);
        }
        drop(held);
        session.retry()?;
    }
}

/// A group of actors sharing one gate permit: the first member in takes it,
/// the last one out gives it back.
#[derive(Default)]
pub(crate) struct Group {
    members: usize,
    gate: Option<OwnedPermit>,
}

/// Joins `group`, taking `gate` if the group is empty.
pub(crate) fn join_group(group: &Lock<Group>, gate: &Arc<Semaphore>, session: &Session) -> Result<(), Cancelled> {
    let mut members = group.lock(session.cancel())?;
    if members.members == 0 {
        members.gate = Some(gate.acquire_owned(session.cancel())?);
    }
    members.members += 1;
    Ok(())
}

pub(crate) fn leave_group(group: &Lock<Group>) {
    let mut members = group.lock_for_release();
    members.members = members.members.saturating_sub(1);
    if members.members == 0 {
        members.gate = None;
    }
}

/// Ends a resident actor's round: leave, rest, come back.
pub(crate) fn rest_between(actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
    actor.advance(ActorState::Leaving);
    actor.advance(ActorState::Idle);
    session.rest()?;
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_vacates_on_drop() {
        let forks = Ownership::new("test", 3);
        {
            let claim = forks.claim(1, ActorId(7));
            assert_eq!(claim.index(), 1);
            assert_eq!(forks.owner(1), Some(ActorId(7)));
            assert_eq!(forks.occupied(), 1);
        }
        assert!(forks.is_free(1));
        assert_eq!(forks.conflicts(), 0);
    }

    #[test]
    fn test_double_claim_is_a_conflict_and_keeps_first_owner() {
        let forks = Ownership::new("test", 2);
        let first = forks.claim(0, ActorId(1));
        {
            let _second = forks.claim(0, ActorId(2));
            assert_eq!(forks.conflicts(), 1);
        }
        assert_eq!(forks.owner(0), Some(ActorId(1)));
        drop(first);
        assert!(forks.is_free(0));
    }

    #[test]
    fn test_claim_any_fills_then_refuses() {
        let seats = Ownership::new("test", 2);
        let a = seats.claim_any(ActorId(1)).unwrap();
        let b = seats.claim_any(ActorId(2)).unwrap();
        assert_ne!(a.index(), b.index());
        assert!(seats.claim_any(ActorId(3)).is_none());
        assert_eq!(seats.conflicts(), 0);
        drop(a);
        assert!(seats.claim_any(ActorId(3)).is_some());
    }

    #[test]
    fn test_out_of_range_claim_is_a_conflict() {
        let chair = Ownership::new("test", 1);
        let _claim = chair.claim(5, ActorId(1));
        assert_eq!(chair.conflicts(), 1);
        assert_eq!(chair.occupied(), 0);
    }

    #[test]
    fn test_violations_count_and_reset() {
        let v = Violations::default();
        v.record("test", "level out of range");
        v.record("test", "level out of range");
        assert_eq!(v.count(), 2);
        v.reset();
        assert_eq!(v.count(), 0);
    }
}
