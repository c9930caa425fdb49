use super::{BufferModel, BufferPoint};
use crate::actor::{Actor, ActorState, Role, Roster};
use crate::primitives::{Barrier, Condition, Lock, Monitor, Primitive, Semaphore};
use crate::problems::{rest_between, spin_until, ResourceModel, Stage};
use crate::strategy::{Cast, Flow, Protocol, Session};
use rendezvous_env::Cancelled;
use std::iter;

type BufferStage = Stage<BufferModel, BufferPoint>;

fn cast(model: &BufferModel) -> Vec<Cast> {
    let config = model.config();
    iter::repeat(Cast::Resident(Role::Producer))
        .take(config.producers)
        .chain(iter::repeat(Cast::Resident(Role::Consumer)).take(config.consumers))
        .collect()
}

fn is_producer(actor: &Actor) -> bool {
    actor.role() == Role::Producer
}

fn can_move(model: &BufferModel, actor: &Actor) -> bool {
    if is_producer(actor) {
        !model.is_full()
    } else {
        !model.is_empty()
    }
}

/// Moves one unit in the actor's direction. The caller reports the
/// returned point once it has let go of the tank.
fn transfer(model: &BufferModel, actor: &Actor) -> BufferPoint {
    if is_producer(actor) {
        BufferPoint::Deposited { level: model.deposit() }
    } else {
        BufferPoint::Withdrawn { level: model.withdraw() }
    }
}

/// Busy-wait: take the tank lock, look, give up and retry.
pub(super) struct MutexBuffer {
    stage: BufferStage,
    tank: Lock<()>,
}

impl MutexBuffer {
    pub(super) fn new(stage: BufferStage) -> Self {
        Self {
            stage,
            tank: Lock::new("tank", ()),
        }
    }
}

impl Protocol for MutexBuffer {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast(&self.stage.model)
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let model = &self.stage.model;
        actor.advance(ActorState::Waiting);
        let tank = actor.hold(spin_until(&self.tank, session, |_| can_move(model, actor))?);
        actor.advance(ActorState::Active);
        let moved = transfer(model, actor);
        drop(tank);
        self.stage.port.emit(actor, moved);
        session.work()?;
        rest_between(actor, session)
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![&self.tank]
    }
}

/// Classic `empty`/`full` counting semaphores around a binary guard.
pub(super) struct SemaphoreBuffer {
    stage: BufferStage,
    empty: Semaphore,
    full: Semaphore,
    guard: Lock<()>,
}

impl SemaphoreBuffer {
    pub(super) fn new(stage: BufferStage) -> Self {
        let level = stage.model.initial_level();
        let free = stage.model.slots() - level;
        Self {
            stage,
            empty: Semaphore::new("empty", free),
            full: Semaphore::new("full", level),
            guard: Lock::new("guard", ()),
        }
    }

    fn produce(&self, actor: &Actor, session: &Session) -> Result<(), Cancelled> {
        let slot = actor.hold(self.empty.acquire(session.cancel())?);
        actor.advance(ActorState::Active);
        session.work()?;
        let guard = actor.hold(self.guard.lock(session.cancel())?);
        let moved = transfer(&self.stage.model, actor);
        drop(guard);
        // The free slot is now a full one
        if let Some(permit) = slot.into_inner() {
            permit.consume();
        }
        self.full.signal();
        self.stage.port.emit(actor, moved);
        Ok(())
    }

    fn consume(&self, actor: &Actor, session: &Session) -> Result<(), Cancelled> {
        self.full.wait(session.cancel())?;
        let guard = match self.guard.lock(session.cancel()) {
            Ok(guard) => actor.hold(guard),
            Err(cancelled) => {
                // Nothing was taken; put the item count back
                self.full.signal();
                return Err(cancelled);
            }
        };
        let moved = transfer(&self.stage.model, actor);
        drop(guard);
        actor.advance(ActorState::Active);
        self.stage.port.emit(actor, moved);
        let outcome = session.work();
        self.empty.signal();
        outcome
    }
}

impl Protocol for SemaphoreBuffer {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast(&self.stage.model)
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        actor.advance(ActorState::Waiting);
        if is_producer(actor) {
            self.produce(actor, session)?;
        } else {
            self.consume(actor, session)?;
        }
        rest_between(actor, session)
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![&self.empty, &self.full, &self.guard]
    }
}

/// Monitor with `not_full` and `not_empty` conditions.
pub(super) struct MonitorBuffer {
    stage: BufferStage,
    monitor: Monitor<()>,
    not_full: Condition,
    not_empty: Condition,
}

impl MonitorBuffer {
    pub(super) fn new(stage: BufferStage) -> Self {
        Self {
            stage,
            monitor: Monitor::new("tank", ()),
            not_full: Condition::new("not_full"),
            not_empty: Condition::new("not_empty"),
        }
    }
}

impl Protocol for MonitorBuffer {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast(&self.stage.model)
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let model = &self.stage.model;
        let (wait_on, wake) = if is_producer(actor) {
            (&self.not_full, &self.not_empty)
        } else {
            (&self.not_empty, &self.not_full)
        };

        actor.advance(ActorState::Waiting);
        let inside = self.monitor.enter();
        let inside = actor.hold(wait_on.wait_while(inside, session.cancel(), |_| !can_move(model, actor))?);
        actor.advance(ActorState::Active);
        let moved = transfer(model, actor);
        wake.signal();
        drop(inside);

        self.stage.port.emit(actor, moved);
        session.work()?;
        rest_between(actor, session)
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![&self.monitor, &self.not_full, &self.not_empty]
    }
}

/// Every producer and consumer meets at a barrier before each move.
pub(super) struct BarrierBuffer {
    stage: BufferStage,
    barrier: Barrier,
    aux: Lock<()>,
}

impl BarrierBuffer {
    pub(super) fn new(stage: BufferStage) -> Self {
        let config = stage.model.config();
        let parties = config.producers + config.consumers;
        Self {
            stage,
            barrier: Barrier::new("round", parties),
            aux: Lock::new("aux", ()),
        }
    }
}

impl Protocol for BarrierBuffer {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast(&self.stage.model)
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        actor.advance(ActorState::Waiting);
        let met = self.barrier.wait(session.cancel())?;
        self.stage.port.emit(
            actor,
            BufferPoint::Rendezvous {
                generation: met.generation(),
            },
        );

        let aux = actor.hold(self.aux.lock(session.cancel())?);
        if can_move(&self.stage.model, actor) {
            actor.advance(ActorState::Active);
            let moved = transfer(&self.stage.model, actor);
            drop(aux);
            self.stage.port.emit(actor, moved);
            session.work()?;
        } else {
            drop(aux);
            self.stage.port.emit(
                actor,
                BufferPoint::Refused {
                    full: is_producer(actor),
                },
            );
        }
        rest_between(actor, session)
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![&self.barrier, &self.aux]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BufferConfig, Timing};
    use crate::instrument::{Listener, Notice, Port};
    use crate::problems::testkit::ctx;
    use rendezvous_env::CancelToken;
    use std::sync::{Arc, Mutex, OnceLock, Weak};

    /// Reads the monitor's own lock state whenever a notice arrives.
    #[derive(Default)]
    struct MonitorAtNotice {
        buffer: OnceLock<Weak<MonitorBuffer>>,
        held: Mutex<Vec<usize>>,
    }

    impl Listener<BufferPoint> for MonitorAtNotice {
        fn notify(&self, _notice: &Notice<BufferPoint>) {
            if let Some(buffer) = self.buffer.get().and_then(Weak::upgrade) {
                self.held.lock().unwrap().push(buffer.monitor.held());
            }
        }
    }

    #[test]
    fn test_monitor_buffer_reports_after_leaving_the_monitor() {
        let listener = Arc::new(MonitorAtNotice::default());
        let model = BufferModel::new(
            BufferConfig {
                slots: 4,
                initial_level: 2,
                producers: 1,
                consumers: 1,
            },
            4,
        );
        let stage = Stage {
            model: Arc::new(model),
            port: Port::new(ctx(), Some(Arc::clone(&listener) as Arc<dyn Listener<BufferPoint>>)),
        };
        let buffer = Arc::new(MonitorBuffer::new(stage));
        assert!(listener.buffer.set(Arc::downgrade(&buffer)).is_ok());

        let session = Session::new(ctx(), CancelToken::new(), Timing::brisk());
        let producer = buffer.stage.model.roster().enroll(Role::Producer);
        let consumer = buffer.stage.model.roster().enroll(Role::Consumer);
        assert!(buffer.round(&producer, &session).is_ok());
        assert!(buffer.round(&consumer, &session).is_ok());

        assert_eq!(*listener.held.lock().unwrap(), vec![0, 0]);
        assert_eq!(buffer.stage.model.level(), 2);
        assert!(buffer.monitor.is_quiescent());
    }
}
