//! The strategy contract and the per-discipline protocol seam.
//!
//! A [`Strategy`] is what the controller starts and stops. Every concrete
//! strategy is a [`Runner`](crate::runner::Runner) driving a [`Protocol`]:
//! the runner owns threads, cancellation and teardown; the protocol owns the
//! primitives and the acquire/use/release round of one discipline.

use crate::actor::{Actor, Priority, Role, Roster};
use crate::config::Timing;
use crate::error::SyncError;
use crate::primitives::{Primitive, PrimitiveStatus};
use crate::problem::{Discipline, Problem};
use rendezvous_env::{CancelToken, Cancelled, RunId, SyncContext};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// A runnable coordination strategy for one problem under one discipline.
pub trait Strategy: Send {
    fn problem(&self) -> Problem;

    fn discipline(&self) -> Discipline;

    /// Allocates primitives and spawns workers. A no-op while running.
    fn start(&mut self) -> Result<(), SyncError>;

    /// Cancels and joins every worker, then audits the primitives.
    ///
    /// Returns promptly even when workers are blocked: every wait observes
    /// the run's cancel token. Stopping a stopped strategy returns an empty
    /// report.
    fn stop(&mut self) -> StopReport;

    fn is_running(&self) -> bool;

    /// Identifier of the current (or last) run.
    fn run_id(&self) -> Option<RunId>;
}

/// What `stop()` found.
#[derive(Debug, Clone, Serialize)]
pub struct StopReport {
    pub run_id: Option<RunId>,
    /// Worker threads joined (residents, spawners and spawned actors)
    pub workers_joined: usize,
    /// Workers whose thread panicked
    pub panicked: usize,
    /// Every primitive the run owned, as found after the last join
    pub primitives: Vec<PrimitiveStatus>,
    pub elapsed: Duration,
}

impl StopReport {
    /// Report for a strategy that was not running.
    pub fn idle() -> Self {
        Self {
            run_id: None,
            workers_joined: 0,
            panicked: 0,
            primitives: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// True when no worker panicked and every primitive is back at rest.
    pub fn is_clean(&self) -> bool {
        self.panicked == 0 && self.primitives.iter().all(PrimitiveStatus::is_quiescent)
    }

    /// Primitives still held or waited on.
    pub fn leaks(&self) -> impl Iterator<Item = &PrimitiveStatus> {
        self.primitives.iter().filter(|p| !p.is_quiescent())
    }
}

/// A worker the runner starts for a protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cast {
    /// One long-lived actor of this role, looping until cancelled
    Resident(Role),
    /// A spawner admitting short-lived actors of this role, one round each
    Spawner(Role),
}

/// What a worker does after a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Retire,
}

/// One discipline's coordination algorithm for one problem.
///
/// A protocol value is built fresh for every run, so its primitives are
/// created on `start` and dropped after `stop`.
pub trait Protocol: Send + Sync + 'static {
    /// Roster of the resource model the protocol coordinates.
    fn roster(&self) -> &Roster;

    /// Workers to start, in order.
    fn cast(&self) -> Vec<Cast>;

    /// Priority of the next spawned actor.
    fn arrival_priority(&self, _session: &Session) -> Priority {
        Priority::Normal
    }

    /// Runs one acquire/use/release round for `actor`.
    ///
    /// On cancellation everything acquired in the round has been released
    /// by the time `Err(Cancelled)` is returned.
    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled>;

    /// Every primitive the protocol owns, for the teardown audit.
    fn primitives(&self) -> Vec<&dyn Primitive>;
}

/// Per-run environment handed to every round.
#[derive(Clone)]
pub struct Session {
    ctx: Arc<dyn SyncContext>,
    cancel: CancelToken,
    timing: Timing,
}

impl Session {
    pub fn new(ctx: Arc<dyn SyncContext>, cancel: CancelToken, timing: Timing) -> Self {
        Self { ctx, cancel, timing }
    }

    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn now(&self) -> Duration {
        self.ctx.now()
    }

    /// Holds the granted resource for the configured use time.
    pub fn work(&self) -> Result<(), Cancelled> {
        self.pause(self.timing.use_time())
    }

    /// Idles between rounds.
    pub fn rest(&self) -> Result<(), Cancelled> {
        self.pause(self.timing.rest_time())
    }

    /// Backs off before a busy-wait retry.
    pub fn retry(&self) -> Result<(), Cancelled> {
        self.pause(self.timing.retry_delay())
    }

    /// Waits for the next spawner arrival.
    pub fn arrival(&self) -> Result<(), Cancelled> {
        self.pause(self.timing.arrival_gap())
    }

    /// Waits for the next token refill.
    pub fn refill(&self) -> Result<(), Cancelled> {
        self.pause(self.timing.refill_gap())
    }

    /// Uniform index in `0..n`.
    pub fn pick(&self, n: usize) -> usize {
        self.ctx.pick(n)
    }

    /// True with probability `share` (to the nearest 0.1%).
    pub fn chance(&self, share: f64) -> bool {
        let threshold = (share.clamp(0.0, 1.0) * 1000.0).round() as usize;
        self.ctx.pick(1000) < threshold
    }

    fn pause(&self, base: Duration) -> Result<(), Cancelled> {
        let d = self.ctx.jitter(base, self.timing.jitter);
        self.ctx.sleep(d, &self.cancel)
    }
}
