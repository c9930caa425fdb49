//! Barber shop: waiting seats, one barber chair, one barber.

use crate::actor::Roster;
use crate::config::BarberConfig;
use crate::problems::{Claim, Ownership, ResourceModel, Violations};
use rendezvous_env::ActorId;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

const MODEL: &str = "barber";

pub struct ShopModel {
    config: BarberConfig,
    roster: Roster,
    seats: Ownership,
    chair: Ownership,
    cutting: AtomicBool,
    served: AtomicU64,
    turned_away: AtomicU64,
    violations: Violations,
}

impl ShopModel {
    pub fn new(config: BarberConfig, live_cap: usize) -> Self {
        let seats = config.waiting_seats;
        Self {
            config,
            roster: Roster::new(live_cap),
            seats: Ownership::new(MODEL, seats),
            chair: Ownership::new(MODEL, 1),
            cutting: AtomicBool::new(false),
            served: AtomicU64::new(0),
            turned_away: AtomicU64::new(0),
            violations: Violations::default(),
        }
    }

    pub fn waiting_seats(&self) -> usize {
        self.config.waiting_seats
    }

    /// Customers sitting in the waiting area.
    pub fn waiting(&self) -> usize {
        self.seats.occupied()
    }

    pub fn seat_owners(&self) -> Vec<Option<ActorId>> {
        self.seats.owners()
    }

    pub fn in_chair(&self) -> Option<ActorId> {
        self.chair.owner(0)
    }

    pub fn is_cutting(&self) -> bool {
        self.cutting.load(Ordering::SeqCst)
    }

    pub fn served(&self) -> u64 {
        self.served.load(Ordering::SeqCst)
    }

    pub fn turned_away(&self) -> u64 {
        self.turned_away.load(Ordering::SeqCst)
    }

    /// Takes a free waiting seat, or records the customer as turned away.
    pub(crate) fn take_seat(&self, customer: ActorId) -> Option<Claim<'_>> {
        let seat = self.seats.claim_any(customer);
        if seat.is_none() {
            self.turned_away.fetch_add(1, Ordering::SeqCst);
        }
        seat
    }

    pub(crate) fn sit_in_chair(&self, customer: ActorId) -> Claim<'_> {
        self.chair.claim(0, customer)
    }

    /// Starts a haircut; someone must be in the chair.
    pub(crate) fn begin_cut(&self) -> Haircut<'_> {
        if self.in_chair().is_none() {
            self.violations.record(MODEL, "cutting an empty chair");
        }
        if self.cutting.swap(true, Ordering::SeqCst) {
            self.violations.record(MODEL, "two haircuts at once");
        }
        Haircut { model: self }
    }
}

impl ResourceModel for ShopModel {
    fn roster(&self) -> &Roster {
        &self.roster
    }

    fn reset(&self) {
        self.seats.reset();
        self.chair.reset();
        self.cutting.store(false, Ordering::SeqCst);
        self.served.store(0, Ordering::SeqCst);
        self.turned_away.store(0, Ordering::SeqCst);
        self.violations.reset();
        self.roster.clear();
    }

    fn violations(&self) -> u64 {
        self.violations.count() + self.seats.conflicts() + self.chair.conflicts()
    }

    fn progress(&self) -> u64 {
        self.served()
    }
}

/// The barber at work.
#[must_use]
pub(crate) struct Haircut<'a> {
    model: &'a ShopModel,
}

impl Drop for Haircut<'_> {
    fn drop(&mut self) {
        self.model.served.fetch_add(1, Ordering::SeqCst);
        self.model.cutting.store(false, Ordering::SeqCst);
    }
}
