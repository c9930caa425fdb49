//! The round table: N seats, N forks, fork `i` between seats `i - 1` and `i`.

use crate::actor::Roster;
use crate::config::DiningConfig;
use crate::problems::{Claim, Ownership, ResourceModel, Violations};
use rendezvous_env::ActorId;
use std::sync::atomic::{AtomicU64, Ordering};

const MODEL: &str = "dining";

pub struct TableModel {
    config: DiningConfig,
    roster: Roster,
    forks: Ownership,
    meals: Vec<AtomicU64>,
    violations: Violations,
}

impl TableModel {
    pub fn new(config: DiningConfig, live_cap: usize) -> Self {
        let seats = config.philosophers;
        Self {
            config,
            roster: Roster::new(live_cap),
            forks: Ownership::new(MODEL, seats),
            meals: (0..seats).map(|_| AtomicU64::new(0)).collect(),
            violations: Violations::default(),
        }
    }

    pub fn seats(&self) -> usize {
        self.config.philosophers
    }

    /// Fork on the seat's left.
    pub fn left(&self, seat: usize) -> usize {
        seat % self.seats()
    }

    /// Fork on the seat's right.
    pub fn right(&self, seat: usize) -> usize {
        (seat + 1) % self.seats()
    }

    pub fn fork_owner(&self, fork: usize) -> Option<ActorId> {
        self.forks.owner(fork)
    }

    pub fn forks_in_use(&self) -> usize {
        self.forks.occupied()
    }

    /// Both of the seat's forks are on the table.
    pub fn both_free(&self, seat: usize) -> bool {
        self.forks.is_free(self.left(seat)) && self.forks.is_free(self.right(seat))
    }

    pub fn meals(&self, seat: usize) -> u64 {
        self.meals.get(seat).map_or(0, |m| m.load(Ordering::SeqCst))
    }

    pub fn total_meals(&self) -> u64 {
        self.meals.iter().map(|m| m.load(Ordering::SeqCst)).sum()
    }

    pub(crate) fn pick_up(&self, fork: usize, owner: ActorId) -> Claim<'_> {
        self.forks.claim(fork, owner)
    }

    /// Counts a meal for `seat`, which must hold both of its forks.
    pub(crate) fn eat(&self, seat: usize, owner: ActorId) -> u64 {
        let left = self.forks.owner(self.left(seat));
        let right = self.forks.owner(self.right(seat));
        if left != Some(owner) || right != Some(owner) {
            self.violations.record(MODEL, "eating without both forks");
        }
        self.meals
            .get(seat)
            .map_or(0, |m| m.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl ResourceModel for TableModel {
    fn roster(&self) -> &Roster {
        &self.roster
    }

    fn reset(&self) {
        self.forks.reset();
        for meals in &self.meals {
            meals.store(0, Ordering::SeqCst);
        }
        self.violations.reset();
        self.roster.clear();
    }

    fn violations(&self) -> u64 {
        self.violations.count() + self.forks.conflicts()
    }

    fn progress(&self) -> u64 {
        self.total_meals()
    }
}
