//! Sleeping barber: one barber, one chair, a few waiting seats. Customers
//! who find every seat taken leave without a haircut.

mod model;
mod protocols;

pub use model::ShopModel;

use super::Stage;
use crate::config::Timing;
use crate::error::SyncError;
use crate::problem::{Discipline, Problem};
use crate::runner::boxed;
use crate::strategy::Strategy;
use protocols::{BarrierBarber, MonitorBarber, MutexBarber, SemaphoreBarber};
use rendezvous_env::SyncContext;
use std::sync::Arc;

/// Protocol points of the barber shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarberPoint {
    /// A customer took waiting seat `seat`
    Seated { seat: usize },
    TurnedAway,
    InChair,
    /// The barber has nobody to serve
    Sleeping,
    CutStarted,
    CutFinished { served: u64 },
    Left,
    Rendezvous { generation: u64 },
}

pub(crate) fn strategy(
    discipline: Discipline,
    stage: Stage<ShopModel, BarberPoint>,
    ctx: Arc<dyn SyncContext>,
    timing: Timing,
) -> Result<Box<dyn Strategy>, SyncError> {
    let problem = Problem::SleepingBarber;
    Ok(match discipline {
        Discipline::Mutex => boxed(problem, discipline, ctx, timing, move || MutexBarber::new(stage.clone())),
        Discipline::Semaphore => boxed(problem, discipline, ctx, timing, move || SemaphoreBarber::new(stage.clone())),
        Discipline::Monitor => boxed(problem, discipline, ctx, timing, move || MonitorBarber::new(stage.clone())),
        Discipline::Barrier => boxed(problem, discipline, ctx, timing, move || BarrierBarber::new(stage.clone())),
        Discipline::Deadlock => return Err(SyncError::Unsupported { problem, discipline }),
    })
}
