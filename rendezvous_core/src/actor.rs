//! Actors: the simulated participants and the roster that owns them.
//!
//! An [`Actor`] is a small state machine shared between its own worker
//! thread (which advances the lifecycle) and observers (which read it). All
//! mutable fields are atomics, so reads never block a worker.
//!
//! ```text
//!   Arriving ──► Waiting ──► Active ──► Leaving ──► Done
//!       │           ▲                      │
//!       └──► Idle ──┘◄─────────────────────┘   (resident actors loop)
//! ```
//!
//! `Done` is reachable from every state: a cancelled worker finishes its
//! actor wherever it was.

use crate::error::SyncError;
use crate::primitives::guard;
use rendezvous_env::ActorId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// What an actor does in its problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Producer,
    Consumer,
    Reader,
    Writer,
    Philosopher,
    Barber,
    Customer,
    Smoker,
    /// The smokers' table agent, or the assistants' token refiller
    Agent,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Producer => "producer",
            Role::Consumer => "consumer",
            Role::Reader => "reader",
            Role::Writer => "writer",
            Role::Philosopher => "philosopher",
            Role::Barber => "barber",
            Role::Customer => "customer",
            Role::Smoker => "smoker",
            Role::Agent => "agent",
        }
    }

    /// The activity shown while the actor is `Active`.
    pub fn activity(&self) -> &'static str {
        match self {
            Role::Producer => "producing",
            Role::Consumer => "consuming",
            Role::Reader => "reading",
            Role::Writer => "writing",
            Role::Philosopher => "eating",
            Role::Barber => "cutting",
            Role::Customer => "being served",
            Role::Smoker => "smoking",
            Role::Agent => "supplying",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Lifecycle state of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ActorState {
    /// Just spawned
    Arriving = 0,
    /// Between rounds (resident actors only)
    Idle = 1,
    /// Requested a resource, not yet granted
    Waiting = 2,
    /// Holding the granted resource
    Active = 3,
    /// Released, on the way out
    Leaving = 4,
    /// Terminal
    Done = 5,
}

impl ActorState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ActorState::Arriving,
            1 => ActorState::Idle,
            2 => ActorState::Waiting,
            3 => ActorState::Active,
            4 => ActorState::Leaving,
            _ => ActorState::Done,
        }
    }

    /// Returns true if the lifecycle allows moving from `self` to `next`.
    pub fn can_advance(self, next: ActorState) -> bool {
        use ActorState::*;
        match (self, next) {
            (Done, _) => false,
            (_, Done) => true,
            (Arriving, Waiting | Idle | Leaving) => true,
            (Idle, Waiting) => true,
            (Waiting, Active | Leaving) => true,
            (Active, Leaving) => true,
            (Leaving, Idle) => true,
            _ => false,
        }
    }
}

/// Request priority (meaningful for assistant requests).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    High,
}

/// Advisory on-screen target supplied by a display collaborator.
///
/// Never read by any strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// A simulated participant.
pub struct Actor {
    id: ActorId,
    role: Role,
    ordinal: usize,
    priority: Priority,
    state: AtomicU8,
    held: AtomicUsize,
    target: Mutex<Option<Position>>,
}

impl Actor {
    fn new(id: ActorId, role: Role, ordinal: usize, priority: Priority) -> Self {
        Self {
            id,
            role,
            ordinal,
            priority,
            state: AtomicU8::new(ActorState::Arriving as u8),
            held: AtomicUsize::new(0),
            target: Mutex::new(None),
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Index among the actors of the same role in this run (seat number,
    /// ingredient, ...).
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn state(&self) -> ActorState {
        ActorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Moves the actor to `next`. Only the actor's own worker calls this.
    ///
    /// An illegal transition is a strategy bug; it is logged and applied
    /// anyway so the observable state matches what the worker does.
    pub(crate) fn advance(&self, next: ActorState) {
        let current = self.state();
        if current == next {
            return;
        }
        if !current.can_advance(next) {
            tracing::warn!(actor = %self.id, role = %self.role, from = ?current, to = ?next, "illegal lifecycle transition");
        }
        self.state.store(next as u8, Ordering::SeqCst);
    }

    /// Number of primitives this actor currently holds.
    pub fn held_permits(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    /// Wraps a guard so it counts toward [`held_permits`](Self::held_permits)
    /// until dropped.
    pub fn hold<G>(&self, guard: G) -> Held<'_, G> {
        self.held.fetch_add(1, Ordering::SeqCst);
        Held {
            guard: Some(guard),
            actor: self,
        }
    }

    pub fn target(&self) -> Option<Position> {
        *guard(&self.target)
    }

    pub fn set_target(&self, target: Option<Position>) {
        *guard(&self.target) = target;
    }

    pub fn snapshot(&self) -> ActorSnapshot {
        ActorSnapshot {
            id: self.id,
            role: self.role,
            ordinal: self.ordinal,
            priority: self.priority,
            state: self.state(),
            held_permits: self.held_permits(),
            target: self.target(),
        }
    }
}

impl std::fmt::Debug for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("ordinal", &self.ordinal)
            .field("state", &self.state())
            .finish()
    }
}

/// A guard counted against its actor's held permits.
pub struct Held<'a, G> {
    guard: Option<G>,
    actor: &'a Actor,
}

impl<G> Held<'_, G> {
    /// Stops counting the guard and hands it back.
    pub fn into_inner(mut self) -> Option<G> {
        let inner = self.guard.take();
        self.actor.held.fetch_sub(1, Ordering::SeqCst);
        inner
    }
}

impl<G> Deref for Held<'_, G> {
    type Target = G;

    fn deref(&self) -> &G {
        match &self.guard {
            Some(g) => g,
            None => unreachable!("held guard is only taken by into_inner"),
        }
    }
}

impl<G> DerefMut for Held<'_, G> {
    fn deref_mut(&mut self) -> &mut G {
        match &mut self.guard {
            Some(g) => g,
            None => unreachable!("held guard is only taken by into_inner"),
        }
    }
}

impl<G> Drop for Held<'_, G> {
    fn drop(&mut self) {
        if let Some(inner) = self.guard.take() {
            drop(inner);
            self.actor.held.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Serializable view of an actor for display collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorSnapshot {
    pub id: ActorId,
    pub role: Role,
    pub ordinal: usize,
    pub priority: Priority,
    pub state: ActorState,
    pub held_permits: usize,
    pub target: Option<Position>,
}

/// The live actor set of one resource model.
///
/// Membership changes happen under one internal lock; actor fields are
/// atomics and are read without it.
pub struct Roster {
    next_id: AtomicU64,
    cap: AtomicUsize,
    members: Mutex<Members>,
}

#[derive(Default)]
struct Members {
    live: Vec<Arc<Actor>>,
    /// The live actors that came through `admit`
    spawned: HashSet<ActorId>,
    ordinals: HashMap<Role, usize>,
}

impl Members {
    fn join(&mut self, id: ActorId, role: Role, priority: Priority) -> Arc<Actor> {
        let ordinal = self.ordinals.entry(role).or_insert(0);
        let actor = Arc::new(Actor::new(id, role, *ordinal, priority));
        *ordinal += 1;
        self.live.push(Arc::clone(&actor));
        actor
    }
}

impl Roster {
    /// Creates an empty roster admitting at most `cap` spawned actors.
    pub fn new(cap: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            cap: AtomicUsize::new(cap),
            members: Mutex::new(Members::default()),
        }
    }

    /// Adds a resident actor. Residents are part of the problem's fixed cast
    /// and are not subject to the live-actor cap.
    pub fn enroll(&self, role: Role) -> Arc<Actor> {
        let id = ActorId(self.next_id.fetch_add(1, Ordering::SeqCst));
        guard(&self.members).join(id, role, Priority::Normal)
    }

    /// Adds a spawned actor, refusing it if the spawned actors still live
    /// have reached the cap. Residents do not count.
    pub fn admit(&self, role: Role, priority: Priority) -> Result<Arc<Actor>, SyncError> {
        let cap = self.cap();
        let mut members = guard(&self.members);
        if members.spawned.len() >= cap {
            return Err(SyncError::CapacityReached { cap });
        }
        let id = ActorId(self.next_id.fetch_add(1, Ordering::SeqCst));
        members.spawned.insert(id);
        Ok(members.join(id, role, priority))
    }

    /// Removes a finished actor.
    pub fn retire(&self, id: ActorId) {
        let mut members = guard(&self.members);
        members.live.retain(|a| a.id() != id);
        members.spawned.remove(&id);
    }

    /// Drops every actor and restarts ordinals. Ids keep increasing.
    pub fn clear(&self) {
        let mut members = guard(&self.members);
        members.live.clear();
        members.spawned.clear();
        members.ordinals.clear();
    }

    pub fn live(&self) -> usize {
        guard(&self.members).live.len()
    }

    /// Live actors counted against the cap.
    pub fn spawned(&self) -> usize {
        guard(&self.members).spawned.len()
    }

    pub fn get(&self, id: ActorId) -> Option<Arc<Actor>> {
        guard(&self.members).live.iter().find(|a| a.id() == id).cloned()
    }

    pub fn actors(&self) -> Vec<Arc<Actor>> {
        guard(&self.members).live.clone()
    }

    pub fn snapshot(&self) -> Vec<ActorSnapshot> {
        guard(&self.members).live.iter().map(|a| a.snapshot()).collect()
    }

    pub fn cap(&self) -> usize {
        self.cap.load(Ordering::SeqCst)
    }

    /// Updates the live-actor cap. Actors already live are not evicted.
    pub fn set_cap(&self, cap: usize) {
        self.cap.store(cap, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lifecycle_happy_path() {
        let roster = Roster::new(4);
        let actor = roster.enroll(Role::Reader);
        assert_eq!(actor.state(), ActorState::Arriving);

        for next in [
            ActorState::Waiting,
            ActorState::Active,
            ActorState::Leaving,
            ActorState::Idle,
            ActorState::Waiting,
            ActorState::Active,
            ActorState::Leaving,
            ActorState::Done,
        ] {
            assert!(actor.state().can_advance(next));
            actor.advance(next);
            assert_eq!(actor.state(), next);
        }
        assert!(!ActorState::Done.can_advance(ActorState::Waiting));
    }

    #[test]
    fn test_active_requires_waiting() {
        assert!(!ActorState::Arriving.can_advance(ActorState::Active));
        assert!(!ActorState::Idle.can_advance(ActorState::Active));
        assert!(!ActorState::Leaving.can_advance(ActorState::Active));
    }

    #[test]
    fn test_admit_respects_cap_but_enroll_does_not() {
        let roster = Roster::new(1);
        roster.enroll(Role::Agent);
        let first = roster.admit(Role::Customer, Priority::Normal).unwrap();
        assert!(matches!(
            roster.admit(Role::Customer, Priority::Normal),
            Err(SyncError::CapacityReached { cap: 1 })
        ));
        roster.enroll(Role::Barber);
        assert_eq!(roster.live(), 3);
        assert_eq!(roster.spawned(), 1);

        roster.set_cap(2);
        let customer = roster.admit(Role::Customer, Priority::High).unwrap();
        assert_eq!(customer.priority(), Priority::High);
        assert_eq!(roster.live(), 4);
        assert_eq!(roster.spawned(), 2);

        roster.retire(customer.id());
        roster.retire(first.id());
        assert_eq!(roster.live(), 2);
        assert_eq!(roster.spawned(), 0);
        assert!(roster.get(customer.id()).is_none());
    }

    #[test]
    fn test_retiring_a_resident_frees_no_spawn_slot() {
        let roster = Roster::new(1);
        let resident = roster.enroll(Role::Barber);
        roster.admit(Role::Customer, Priority::Normal).unwrap();
        roster.retire(resident.id());
        assert!(roster.admit(Role::Customer, Priority::Normal).is_err());
        roster.clear();
        assert!(roster.admit(Role::Customer, Priority::Normal).is_ok());
    }

    #[test]
    fn test_ordinals_are_per_role_and_reset_on_clear() {
        let roster = Roster::new(10);
        let p0 = roster.enroll(Role::Philosopher);
        let p1 = roster.enroll(Role::Philosopher);
        let s0 = roster.enroll(Role::Smoker);
        assert_eq!((p0.ordinal(), p1.ordinal(), s0.ordinal()), (0, 1, 0));
        assert_ne!(p0.id(), p1.id());

        roster.clear();
        assert_eq!(roster.live(), 0);
        let again = roster.enroll(Role::Philosopher);
        assert_eq!(again.ordinal(), 0);
        assert!(again.id() > s0.id());
    }

    #[test]
    fn test_held_counts_guards() {
        let roster = Roster::new(1);
        let actor = roster.enroll(Role::Writer);
        {
            let _a = actor.hold(1u8);
            let b = actor.hold(2u8);
            assert_eq!(actor.held_permits(), 2);
            assert_eq!(b.into_inner(), Some(2));
            assert_eq!(actor.held_permits(), 1);
        }
        assert_eq!(actor.held_permits(), 0);
    }

    #[test]
    fn test_target_is_advisory() {
        let roster = Roster::new(1);
        let actor = roster.enroll(Role::Customer);
        assert_eq!(actor.target(), None);
        actor.set_target(Some(Position { x: 1.0, y: 2.0 }));
        assert_eq!(actor.snapshot().target, Some(Position { x: 1.0, y: 2.0 }));
    }

    fn any_state() -> impl Strategy<Value = ActorState> {
        (0u8..6).prop_map(ActorState::from_u8)
    }

    proptest! {
        #[test]
        fn prop_done_is_terminal_and_always_reachable(state in any_state(), next in any_state()) {
            prop_assert!(!ActorState::Done.can_advance(next));
            if state != ActorState::Done {
                prop_assert!(state.can_advance(ActorState::Done));
            }
        }

        #[test]
        fn prop_active_only_from_waiting(state in any_state()) {
            if state.can_advance(ActorState::Active) {
                prop_assert_eq!(state, ActorState::Waiting);
            }
        }
    }
}
