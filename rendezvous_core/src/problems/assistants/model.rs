//! The assistant desk: K assistants and a token bucket.
//!
//! A request is admitted by spending one token and taking a free
//! assistant. While any High request is queued, Normal requests must wait.

use crate::actor::{Priority, Roster};
use crate::config::AssistantsConfig;
use crate::problems::{Claim, Ownership, ResourceModel, Violations};
use rendezvous_env::ActorId;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

const MODEL: &str = "assistants";

pub struct DeskModel {
    config: AssistantsConfig,
    roster: Roster,
    desks: Ownership,
    tokens: AtomicUsize,
    high_waiting: AtomicUsize,
    served_high: AtomicU64,
    served_normal: AtomicU64,
    refills: AtomicU64,
    violations: Violations,
}

impl DeskModel {
    pub fn new(config: AssistantsConfig, live_cap: usize) -> Self {
        let desks = Ownership::new(MODEL, config.assistants);
        let tokens = AtomicUsize::new(config.initial_tokens);
        Self {
            config,
            roster: Roster::new(live_cap),
            desks,
            tokens,
            high_waiting: AtomicUsize::new(0),
            served_high: AtomicU64::new(0),
            served_normal: AtomicU64::new(0),
            refills: AtomicU64::new(0),
            violations: Violations::default(),
        }
    }

    pub fn config(&self) -> &AssistantsConfig {
        &self.config
    }

    /// Number of assistants (K).
    pub fn assistants(&self) -> usize {
        self.config.assistants
    }

    pub fn bucket_capacity(&self) -> usize {
        self.config.bucket_capacity
    }

    pub fn tokens(&self) -> usize {
        self.tokens.load(Ordering::SeqCst)
    }

    /// Assistants currently in a session.
    pub fn busy(&self) -> usize {
        self.desks.occupied()
    }

    pub fn assistant_owners(&self) -> Vec<Option<ActorId>> {
        self.desks.owners()
    }

    /// High requests queued and not yet admitted.
    ///
    /// A request is counted once it queues, not when it arrives. Under the
    /// Semaphore discipline a High that finds the turnstile held by a waiting
    /// Normal blocks in its group entry first, and stays uncounted until that
    /// Normal is admitted and hands the turnstile over. A Normal admitted
    /// while this reads zero may therefore still overtake such a High.
    pub fn high_waiting(&self) -> usize {
        self.high_waiting.load(Ordering::SeqCst)
    }

    pub fn served_high(&self) -> u64 {
        self.served_high.load(Ordering::SeqCst)
    }

    pub fn served_normal(&self) -> u64 {
        self.served_normal.load(Ordering::SeqCst)
    }

    pub fn served(&self) -> u64 {
        self.served_high() + self.served_normal()
    }

    /// Tokens added by the agent since the last reset.
    pub fn refills(&self) -> u64 {
        self.refills.load(Ordering::SeqCst)
    }

    /// True when a request of `priority` could be admitted right now.
    pub fn can_admit(&self, priority: Priority) -> bool {
        self.tokens() > 0
            && self.busy() < self.assistants()
            && (priority == Priority::High || self.high_waiting() == 0)
    }

    /// Adds one token unless the bucket is full. Returns the new count.
    pub(crate) fn refill(&self) -> Option<usize> {
        let cap = self.config.bucket_capacity;
        let previous = self
            .tokens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| (t < cap).then_some(t + 1))
            .ok()?;
        self.refills.fetch_add(1, Ordering::SeqCst);
        Some(previous + 1)
    }

    /// Puts a request in the queue. High requests count toward
    /// [`high_waiting`](Self::high_waiting) until admitted or dropped.
    pub(crate) fn queue(&self, priority: Priority) -> Ticket<'_> {
        if priority == Priority::High {
            self.high_waiting.fetch_add(1, Ordering::SeqCst);
        }
        Ticket { model: self, priority }
    }

    /// Admits a queued request: spends a token and assigns a free assistant.
    pub(crate) fn admit(&self, ticket: Ticket<'_>, customer: ActorId) -> Consultation<'_> {
        let priority = ticket.priority;
        drop(ticket);
        if priority == Priority::Normal && self.high_waiting() > 0 {
            self.violations.record(MODEL, "normal request admitted while a high one waits");
        }
        if self
            .tokens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| t.checked_sub(1))
            .is_err()
        {
            self.violations.record(MODEL, "admitted without a token");
        }
        let desk = self.desks.claim_any(customer);
        if desk.is_none() {
            self.violations.record(MODEL, "admitted without a free assistant");
        }
        Consultation {
            model: self,
            desk,
            priority,
        }
    }
}

impl ResourceModel for DeskModel {
    fn roster(&self) -> &Roster {
        &self.roster
    }

    fn reset(&self) {
        self.desks.reset();
        self.tokens.store(self.config.initial_tokens, Ordering::SeqCst);
        self.high_waiting.store(0, Ordering::SeqCst);
        self.served_high.store(0, Ordering::SeqCst);
        self.served_normal.store(0, Ordering::SeqCst);
        self.refills.store(0, Ordering::SeqCst);
        self.violations.reset();
        self.roster.clear();
    }

    fn violations(&self) -> u64 {
        self.violations.count() + self.desks.conflicts()
    }

    fn progress(&self) -> u64 {
        self.served()
    }
}

/// A queued request.
#[must_use]
pub(crate) struct Ticket<'a> {
    model: &'a DeskModel,
    priority: Priority,
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if self.priority == Priority::High {
            self.model.high_waiting.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// An admitted request in session with an assistant.
#[must_use]
pub(crate) struct Consultation<'a> {
    model: &'a DeskModel,
    desk: Option<Claim<'a>>,
    priority: Priority,
}

impl Consultation<'_> {
    pub(crate) fn assistant(&self) -> Option<usize> {
        self.desk.as_ref().map(Claim::index)
    }
}

impl Drop for Consultation<'_> {
    fn drop(&mut self) {
        let served = match self.priority {
            Priority::High => &self.model.served_high,
            Priority::Normal => &self.model.served_normal,
        };
        served.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desk(assistants: usize, capacity: usize, initial: usize) -> DeskModel {
        DeskModel::new(
            AssistantsConfig {
                assistants,
                bucket_capacity: capacity,
                initial_tokens: initial,
                high_priority_share: 0.5,
            },
            8,
        )
    }

    #[test]
    fn test_refill_stops_at_capacity() {
        let model = desk(2, 3, 1);
        assert_eq!(model.refill(), Some(2));
        assert_eq!(model.refill(), Some(3));
        assert_eq!(model.refill(), None);
        assert_eq!(model.tokens(), 3);
        assert_eq!(model.refills(), 2);
    }

    #[test]
    fn test_admission_spends_a_token_and_takes_a_desk() {
        let model = desk(2, 3, 2);
        let ticket = model.queue(Priority::Normal);
        let session = model.admit(ticket, ActorId(1));
        assert_eq!(session.assistant(), Some(0));
        assert_eq!(model.tokens(), 1);
        assert_eq!(model.busy(), 1);

        drop(session);
        assert_eq!(model.busy(), 0);
        assert_eq!(model.served_normal(), 1);
        assert_eq!(model.violations(), 0);
    }

    #[test]
    fn test_high_ticket_blocks_normal_admission() {
        let model = desk(2, 3, 3);
        let high = model.queue(Priority::High);
        assert_eq!(model.high_waiting(), 1);
        assert!(!model.can_admit(Priority::Normal));
        assert!(model.can_admit(Priority::High));

        let normal = model.queue(Priority::Normal);
        drop(model.admit(normal, ActorId(2)));
        assert_eq!(model.violations(), 1);

        drop(high);
        assert_eq!(model.high_waiting(), 0);
        assert!(model.can_admit(Priority::Normal));
    }

    #[test]
    fn test_admission_without_resources_is_a_violation() {
        let model = desk(1, 2, 0);
        let a = model.admit(model.queue(Priority::High), ActorId(1));
        assert_eq!(model.violations(), 1);
        model.refill();
        let _b = model.admit(model.queue(Priority::High), ActorId(2));
        assert_eq!(model.violations(), 2);
        assert_eq!(a.assistant(), Some(0));
    }

    #[test]
    fn test_reset_refills_to_initial() {
        let model = desk(2, 4, 2);
        drop(model.admit(model.queue(Priority::High), ActorId(1)));
        model.reset();
        assert_eq!(model.tokens(), 2);
        assert_eq!(model.served(), 0);
    }
}
