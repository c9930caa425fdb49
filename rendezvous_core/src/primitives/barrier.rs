//! Fixed-party rendezvous barrier.

use super::{guard, wait_slice, Primitive};
use rendezvous_env::{CancelToken, Cancelled};
use std::sync::{Condvar, Mutex};

/// A barrier that releases its parties only once all of them have arrived.
///
/// Unlike `std::sync::Barrier`, a waiting party can withdraw when its token
/// trips; the arrival count is rolled back so the barrier stays consistent
/// for anyone still waiting.
pub struct Barrier {
    name: String,
    parties: usize,
    state: Mutex<Round>,
    cv: Condvar,
}

struct Round {
    arrived: usize,
    generation: u64,
}

/// Outcome of a completed rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    generation: u64,
}

impl BarrierWaitResult {
    /// Round number this rendezvous completed.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Barrier {
    /// Creates a barrier for `parties` participants (at least one).
    pub fn new(name: impl Into<String>, parties: usize) -> Self {
        Self {
            name: name.into(),
            parties: parties.max(1),
            state: Mutex::new(Round {
                arrived: 0,
                generation: 0,
            }),
            cv: Condvar::new(),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Blocks until all parties of the current round have arrived.
    pub fn wait(&self, cancel: &CancelToken) -> Result<BarrierWaitResult, Cancelled> {
        let mut round = guard(&self.state);
        let generation = round.generation;
        round.arrived += 1;

        if round.arrived == self.parties {
            round.arrived = 0;
            round.generation += 1;
            drop(round);
            self.cv.notify_all();
            return Ok(BarrierWaitResult { generation });
        }

        loop {
            round = wait_slice(&self.cv, round);
            if round.generation != generation {
                return Ok(BarrierWaitResult { generation });
            }
            if cancel.is_cancelled() {
                round.arrived -= 1;
                return Err(Cancelled);
            }
        }
    }

    /// Rounds completed so far.
    pub fn generation(&self) -> u64 {
        guard(&self.state).generation
    }
}

impl Primitive for Barrier {
    fn name(&self) -> &str {
        &self.name
    }

    fn held(&self) -> usize {
        0
    }

    fn waiting(&self) -> usize {
        guard(&self.state).arrived
    }
}
