//! Dining philosophers: N philosophers, N forks, each needs both neighbouring
//! forks to eat. The only problem with a deadlock demonstration.

mod model;
mod protocols;

pub use model::TableModel;

use super::Stage;
use crate::config::Timing;
use crate::error::SyncError;
use crate::problem::{Discipline, Problem};
use crate::runner::boxed;
use crate::strategy::Strategy;
use protocols::{BarrierDining, DeadlockDining, MonitorDining, MutexDining, SemaphoreDining};
use rendezvous_env::SyncContext;
use std::sync::Arc;

/// Protocol points of the dining table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiningPoint {
    Hungry,
    PickedUp { fork: usize },
    /// `meals` counts this seat's meals including the current one
    Eating { meals: u64 },
    PutDown,
    /// A barrier round found a fork missing
    Skipped,
    Rendezvous { generation: u64 },
}

pub(crate) fn strategy(
    discipline: Discipline,
    stage: Stage<TableModel, DiningPoint>,
    ctx: Arc<dyn SyncContext>,
    timing: Timing,
) -> Result<Box<dyn Strategy>, SyncError> {
    let problem = Problem::DiningPhilosophers;
    Ok(match discipline {
        Discipline::Mutex => boxed(problem, discipline, ctx, timing, move || MutexDining::new(stage.clone())),
        Discipline::Semaphore => boxed(problem, discipline, ctx, timing, move || SemaphoreDining::new(stage.clone())),
        Discipline::Monitor => boxed(problem, discipline, ctx, timing, move || MonitorDining::new(stage.clone())),
        Discipline::Barrier => boxed(problem, discipline, ctx, timing, move || BarrierDining::new(stage.clone())),
        Discipline::Deadlock => boxed(problem, discipline, ctx, timing, move || DeadlockDining::new(stage.clone())),
    })
}
