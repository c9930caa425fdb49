//! The smokers' table: at most two ingredients at a time.

use crate::actor::Roster;
use crate::problems::{ResourceModel, Violations};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

const MODEL: &str = "smokers";

/// One of the three ingredients. Smoker `i` holds an endless supply of
/// `Ingredient::ALL[i]` and needs the other two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ingredient {
    Tobacco,
    Paper,
    Matches,
}

impl Ingredient {
    pub const ALL: [Ingredient; 3] = [Ingredient::Tobacco, Ingredient::Paper, Ingredient::Matches];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % 3]
    }

    /// The two ingredients that are not `self`.
    pub fn others(self) -> [Ingredient; 2] {
        let i = self.index();
        [Self::from_index(i + 1), Self::from_index(i + 2)]
    }
}

pub struct SmokersModel {
    roster: Roster,
    table: [AtomicBool; 3],
    smokes: [AtomicU64; 3],
    placements: AtomicU64,
    violations: Violations,
}

impl SmokersModel {
    pub fn new(live_cap: usize) -> Self {
        Self {
            roster: Roster::new(live_cap),
            table: Default::default(),
            smokes: Default::default(),
            placements: AtomicU64::new(0),
            violations: Violations::default(),
        }
    }

    pub fn on_table(&self) -> Vec<Ingredient> {
        Ingredient::ALL
            .into_iter()
            .filter(|i| self.table[i.index()].load(Ordering::SeqCst))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.table.iter().all(|slot| !slot.load(Ordering::SeqCst))
    }

    /// True when the table holds exactly what `smoker` lacks.
    pub fn ready_for(&self, smoker: Ingredient) -> bool {
        smoker
            .others()
            .iter()
            .all(|i| self.table[i.index()].load(Ordering::SeqCst))
            && !self.table[smoker.index()].load(Ordering::SeqCst)
    }

    pub fn smokes(&self, smoker: Ingredient) -> u64 {
        self.smokes[smoker.index()].load(Ordering::SeqCst)
    }

    pub fn placements(&self) -> u64 {
        self.placements.load(Ordering::SeqCst)
    }

    /// Puts down every ingredient except `missing`.
    pub(crate) fn place(&self, missing: Ingredient) -> [Ingredient; 2] {
        if !self.is_empty() {
            self.violations.record(MODEL, "ingredients placed on a non-empty table");
        }
        let pair = missing.others();
        for i in pair {
            self.table[i.index()].store(true, Ordering::SeqCst);
        }
        self.placements.fetch_add(1, Ordering::SeqCst);
        pair
    }

    /// `smoker` picks up both ingredients it lacks.
    pub(crate) fn take(&self, smoker: Ingredient) {
        if !self.ready_for(smoker) {
            self.violations.record(MODEL, "ingredients taken without both present");
        }
        for i in smoker.others() {
            self.table[i.index()].store(false, Ordering::SeqCst);
        }
        self.smokes[smoker.index()].fetch_add(1, Ordering::SeqCst);
    }
}

impl ResourceModel for SmokersModel {
    fn roster(&self) -> &Roster {
        &self.roster
    }

    fn reset(&self) {
        for slot in &self.table {
            slot.store(false, Ordering::SeqCst);
        }
        for count in &self.smokes {
            count.store(0, Ordering::SeqCst);
        }
        self.placements.store(0, Ordering::SeqCst);
        self.violations.reset();
        self.roster.clear();
    }

    fn violations(&self) -> u64 {
        self.violations.count()
    }

    fn progress(&self) -> u64 {
        self.smokes.iter().map(|s| s.load(Ordering::SeqCst)).sum()
    }
}
