use super::{RwModel, RwPoint};
use crate::actor::{Actor, ActorState, Role, Roster};
use crate::config::RwPolicy;
use crate::primitives::{Barrier, Condition, Lock, Monitor, Primitive, Semaphore};
use crate::problems::{join_group, leave_group, rest_between, spin_until, Group, ResourceModel, Stage};
use crate::strategy::{Cast, Flow, Protocol, Session};
use rendezvous_env::Cancelled;
use std::iter;
use std::sync::Arc;

type RwStage = Stage<RwModel, RwPoint>;

fn cast(model: &RwModel) -> Vec<Cast> {
    let config = model.config();
    iter::repeat(Cast::Resident(Role::Reader))
        .take(config.readers)
        .chain(iter::repeat(Cast::Resident(Role::Writer)).take(config.writers))
        .collect()
}

fn is_reader(actor: &Actor) -> bool {
    actor.role() == Role::Reader
}

/// Reads (or writes) for one use time inside the record.
fn read(stage: &RwStage, actor: &Actor, session: &Session) -> Result<(), Cancelled> {
    let inside = stage.model.begin_read();
    actor.advance(ActorState::Active);
    stage.port.emit(
        actor,
        RwPoint::StartedReading {
            readers: stage.model.readers_active(),
        },
    );
    let outcome = session.work();
    drop(inside);
    stage.port.emit(actor, RwPoint::FinishedReading);
    outcome
}

/// Returns the `FinishedWriting` point, which the caller reports once it
/// has let go of whatever admitted it.
fn write(stage: &RwStage, actor: &Actor, session: &Session) -> (RwPoint, Result<(), Cancelled>) {
    let inside = stage.model.begin_write();
    actor.advance(ActorState::Active);
    stage.port.emit(actor, RwPoint::StartedWriting);
    let outcome = session.work();
    drop(inside);
    let finished = RwPoint::FinishedWriting {
        version: stage.model.writes(),
    };
    (finished, outcome)
}

/// Busy-wait on the occupancy counts under one lock.
pub(super) struct MutexRw {
    stage: RwStage,
    record: Lock<()>,
}

impl MutexRw {
    pub(super) fn new(stage: RwStage) -> Self {
        Self {
            stage,
            record: Lock::new("record", ()),
        }
    }
}

impl Protocol for MutexRw {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast(&self.stage.model)
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let model = &self.stage.model;
        actor.advance(ActorState::Waiting);
        if is_reader(actor) {
            let check = spin_until(&self.record, session, |_| model.writers_active() == 0)?;
            let inside = model.begin_read();
            drop(check);
            actor.advance(ActorState::Active);
            self.stage.port.emit(
                actor,
                RwPoint::StartedReading {
                    readers: model.readers_active(),
                },
            );
            let outcome = session.work();
            drop(inside);
            self.stage.port.emit(actor, RwPoint::FinishedReading);
            outcome?;
        } else {
            let queued = model.queue_writer();
            let check = spin_until(&self.record, session, |_| {
                model.writers_active() == 0 && model.readers_active() == 0
            })?;
            drop(queued);
            let inside = model.begin_write();
            drop(check);
            actor.advance(ActorState::Active);
            self.stage.port.emit(actor, RwPoint::StartedWriting);
            let outcome = session.work();
            drop(inside);
            self.stage.port.emit(
                actor,
                RwPoint::FinishedWriting {
                    version: model.writes(),
                },
            );
            outcome?;
        }
        rest_between(actor, session)
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![&self.record]
    }
}

/// Reader preference: the reader group holds `rw_gate` while any reader is
/// inside, so writers wait for a gap in the reader stream.
pub(super) struct ReaderPreferenceRw {
    stage: RwStage,
    rw_gate: Arc<Semaphore>,
    readers: Lock<Group>,
}

impl ReaderPreferenceRw {
    pub(super) fn new(stage: RwStage) -> Self {
        Self {
            stage,
            rw_gate: Arc::new(Semaphore::new("rw_gate", 1)),
            readers: Lock::new("read_count", Group::default()),
        }
    }
}

impl Protocol for ReaderPreferenceRw {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast(&self.stage.model)
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        actor.advance(ActorState::Waiting);
        if is_reader(actor) {
            join_group(&self.readers, &self.rw_gate, session)?;
            let outcome = read(&self.stage, actor, session);
            leave_group(&self.readers);
            outcome?;
        } else {
            let queued = self.stage.model.queue_writer();
            let gate = actor.hold(self.rw_gate.acquire(session.cancel())?);
            drop(queued);
            let (finished, outcome) = write(&self.stage, actor, session);
            drop(gate);
            self.stage.port.emit(actor, finished);
            outcome?;
        }
        rest_between(actor, session)
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![self.rw_gate.as_ref(), &self.readers]
    }
}

/// Writer preference: the writer group holds the `read_try` turnstile while
/// any writer is queued or writing, so no new reader gets in.
pub(super) struct WriterPreferenceRw {
    stage: RwStage,
    read_try: Arc<Semaphore>,
    resource: Arc<Semaphore>,
    readers: Lock<Group>,
    writers: Lock<Group>,
}

impl WriterPreferenceRw {
    pub(super) fn new(stage: RwStage) -> Self {
        Self {
            stage,
            read_try: Arc::new(Semaphore::new("read_try", 1)),
            resource: Arc::new(Semaphore::new("resource", 1)),
            readers: Lock::new("read_count", Group::default()),
            writers: Lock::new("write_count", Group::default()),
        }
    }

    fn reader(&self, actor: &Actor, session: &Session) -> Result<(), Cancelled> {
        let turnstile = actor.hold(self.read_try.acquire(session.cancel())?);
        join_group(&self.readers, &self.resource, session)?;
        drop(turnstile);
        let outcome = read(&self.stage, actor, session);
        leave_group(&self.readers);
        outcome
    }

    fn writer(&self, actor: &Actor, session: &Session) -> Result<(), Cancelled> {
        let queued = self.stage.model.queue_writer();
        join_group(&self.writers, &self.read_try, session)?;
        let resource = match self.resource.acquire(session.cancel()) {
            Ok(permit) => actor.hold(permit),
            Err(cancelled) => {
                leave_group(&self.writers);
                return Err(cancelled);
            }
        };
        drop(queued);
        let (finished, outcome) = write(&self.stage, actor, session);
        drop(resource);
        leave_group(&self.writers);
        self.stage.port.emit(actor, finished);
        outcome
    }
}

impl Protocol for WriterPreferenceRw {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast(&self.stage.model)
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        actor.advance(ActorState::Waiting);
        if is_reader(actor) {
            self.reader(actor, session)?;
        } else {
            self.writer(actor, session)?;
        }
        rest_between(actor, session)
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![
            self.read_try.as_ref(),
            self.resource.as_ref(),
            &self.readers,
            &self.writers,
        ]
    }
}

#[derive(Default)]
struct RecordState {
    readers: usize,
    writing: bool,
    writers_waiting: usize,
}

/// Monitor with `can_read` / `can_write` under either policy.
pub(super) struct MonitorRw {
    stage: RwStage,
    policy: RwPolicy,
    monitor: Monitor<RecordState>,
    can_read: Condition,
    can_write: Condition,
}

impl MonitorRw {
    pub(super) fn new(stage: RwStage) -> Self {
        let policy = stage.model.config().policy;
        Self {
            stage,
            policy,
            monitor: Monitor::new("record", RecordState::default()),
            can_read: Condition::new("can_read"),
            can_write: Condition::new("can_write"),
        }
    }

    fn reader(&self, actor: &Actor, session: &Session) -> Result<(), Cancelled> {
        let writer_first = self.policy == RwPolicy::WriterPreference;
        let inside = self.monitor.enter();
        let mut inside = self.can_read.wait_while(inside, session.cancel(), |s| {
            s.writing || (writer_first && s.writers_waiting > 0)
        })?;
        inside.readers += 1;
        drop(inside);

        let outcome = read(&self.stage, actor, session);

        let mut inside = self.monitor.enter();
        inside.readers -= 1;
        if inside.readers == 0 {
            self.can_write.signal();
        }
        outcome
    }

    fn writer(&self, actor: &Actor, session: &Session) -> Result<(), Cancelled> {
        let queued = self.stage.model.queue_writer();
        let mut inside = self.monitor.enter();
        inside.writers_waiting += 1;
        let mut inside = match self
            .can_write
            .wait_while(inside, session.cancel(), |s| s.writing || s.readers > 0)
        {
            Ok(inside) => inside,
            Err(cancelled) => {
                self.monitor.enter().writers_waiting -= 1;
                self.can_read.broadcast();
                return Err(cancelled);
            }
        };
        inside.writers_waiting -= 1;
        inside.writing = true;
        drop(inside);
        drop(queued);

        let (finished, outcome) = write(&self.stage, actor, session);
        self.stage.port.emit(actor, finished);

        let mut inside = self.monitor.enter();
        inside.writing = false;
        let writers_next = self.policy == RwPolicy::WriterPreference && inside.writers_waiting > 0;
        drop(inside);
        if writers_next {
            self.can_write.signal();
        } else {
            self.can_read.broadcast();
            self.can_write.signal();
        }
        outcome
    }
}

impl Protocol for MonitorRw {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast(&self.stage.model)
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        actor.advance(ActorState::Waiting);
        if is_reader(actor) {
            self.reader(actor, session)?;
        } else {
            self.writer(actor, session)?;
        }
        rest_between(actor, session)
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![&self.monitor, &self.can_read, &self.can_write]
    }
}

/// Two-phase rounds: every reader reads, all meet, writers write one at a
/// time under the auxiliary lock, all meet again.
pub(super) struct BarrierRw {
    stage: RwStage,
    barrier: Barrier,
    aux: Lock<()>,
}

impl BarrierRw {
    pub(super) fn new(stage: RwStage) -> Self {
        let config = stage.model.config();
        let parties = config.readers + config.writers;
        Self {
            stage,
            barrier: Barrier::new("phase", parties),
            aux: Lock::new("aux", ()),
        }
    }

    fn meet(&self, actor: &Actor, session: &Session) -> Result<(), Cancelled> {
        let met = self.barrier.wait(session.cancel())?;
        self.stage.port.emit(
            actor,
            RwPoint::Rendezvous {
                generation: met.generation(),
            },
        );
        Ok(())
    }
}

impl Protocol for BarrierRw {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast(&self.stage.model)
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        actor.advance(ActorState::Waiting);
        if is_reader(actor) {
            // Read phase
            read(&self.stage, actor, session)?;
            actor.advance(ActorState::Leaving);
            self.meet(actor, session)?;
            self.meet(actor, session)?;
        } else {
            self.meet(actor, session)?;
            // Write phase
            let queued = self.stage.model.queue_writer();
            let aux = actor.hold(self.aux.lock(session.cancel())?);
            drop(queued);
            let (finished, outcome) = write(&self.stage, actor, session);
            drop(aux);
            self.stage.port.emit(actor, finished);
            outcome?;
            actor.advance(ActorState::Leaving);
            self.meet(actor, session)?;
        }
        rest_between(actor, session)
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![&self.barrier, &self.aux]
    }
}
