//! Readers-writers: any number of readers or exactly one writer inside the
//! shared record at a time.

mod model;
mod protocols;

pub use model::RwModel;

use super::Stage;
use crate::config::{RwPolicy, Timing};
use crate::error::SyncError;
use crate::problem::{Discipline, Problem};
use crate::runner::boxed;
use crate::strategy::Strategy;
use protocols::{BarrierRw, MonitorRw, MutexRw, ReaderPreferenceRw, WriterPreferenceRw};
use rendezvous_env::SyncContext;
use std::sync::Arc;

/// Protocol points of readers-writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RwPoint {
    StartedReading { readers: usize },
    FinishedReading,
    StartedWriting,
    /// `version` counts completed writes
    FinishedWriting { version: u64 },
    Rendezvous { generation: u64 },
}

pub(crate) fn strategy(
    discipline: Discipline,
    stage: Stage<RwModel, RwPoint>,
    ctx: Arc<dyn SyncContext>,
    timing: Timing,
) -> Result<Box<dyn Strategy>, SyncError> {
    let problem = Problem::ReadersWriters;
    let policy = stage.model.config().policy;
    Ok(match (discipline, policy) {
        (Discipline::Mutex, _) => boxed(problem, discipline, ctx, timing, move || MutexRw::new(stage.clone())),
        (Discipline::Semaphore, RwPolicy::ReaderPreference) => {
            boxed(problem, discipline, ctx, timing, move || ReaderPreferenceRw::new(stage.clone()))
        }
        (Discipline::Semaphore, RwPolicy::WriterPreference) => {
            boxed(problem, discipline, ctx, timing, move || WriterPreferenceRw::new(stage.clone()))
        }
        (Discipline::Monitor, _) => boxed(problem, discipline, ctx, timing, move || MonitorRw::new(stage.clone())),
        (Discipline::Barrier, _) => boxed(problem, discipline, ctx, timing, move || BarrierRw::new(stage.clone())),
        (Discipline::Deadlock, _) => return Err(SyncError::Unsupported { problem, discipline }),
    })
}
