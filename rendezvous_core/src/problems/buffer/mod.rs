//! Bounded buffer: producers fill a tank of `SLOTS` units, consumers drain
//! it. The level never leaves `[0, SLOTS]`.

mod model;
mod protocols;

pub use model::BufferModel;

use super::Stage;
use crate::config::Timing;
use crate::error::SyncError;
use crate::problem::{Discipline, Problem};
use crate::runner::boxed;
use crate::strategy::Strategy;
use protocols::{BarrierBuffer, MonitorBuffer, MutexBuffer, SemaphoreBuffer};
use rendezvous_env::SyncContext;
use std::sync::Arc;

/// Protocol points of the bounded buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPoint {
    /// A producer added a unit
    Deposited { level: usize },
    /// A consumer removed a unit
    Withdrawn { level: usize },
    /// A barrier round found the tank full (producer) or empty (consumer)
    Refused { full: bool },
    /// All producers and consumers met
    Rendezvous { generation: u64 },
}

pub(crate) fn strategy(
    discipline: Discipline,
    stage: Stage<BufferModel, BufferPoint>,
    ctx: Arc<dyn SyncContext>,
    timing: Timing,
) -> Result<Box<dyn Strategy>, SyncError> {
    let problem = Problem::BoundedBuffer;
    Ok(match discipline {
        Discipline::Mutex => boxed(problem, discipline, ctx, timing, move || MutexBuffer::new(stage.clone())),
        Discipline::Semaphore => boxed(problem, discipline, ctx, timing, move || SemaphoreBuffer::new(stage.clone())),
        Discipline::Monitor => boxed(problem, discipline, ctx, timing, move || MonitorBuffer::new(stage.clone())),
        Discipline::Barrier => boxed(problem, discipline, ctx, timing, move || BarrierBuffer::new(stage.clone())),
        Discipline::Deadlock => return Err(SyncError::Unsupported { problem, discipline }),
    })
}
