use super::{DiningPoint, TableModel};
use crate::actor::{Actor, ActorState, Role, Roster};
use crate::primitives::{Barrier, Condition, Lock, Monitor, Primitive, Semaphore};
use crate::problems::{rest_between, spin_until, ResourceModel, Stage};
use crate::strategy::{Cast, Flow, Protocol, Session};
use rendezvous_env::Cancelled;

type TableStage = Stage<TableModel, DiningPoint>;

fn cast(model: &TableModel) -> Vec<Cast> {
    vec![Cast::Resident(Role::Philosopher); model.seats()]
}

fn forks(model: &TableModel) -> Vec<Semaphore> {
    (0..model.seats())
        .map(|i| Semaphore::new(format!("fork[{i}]"), 1))
        .collect()
}

fn hungry(stage: &TableStage, actor: &Actor) {
    actor.advance(ActorState::Waiting);
    stage.port.emit(actor, DiningPoint::Hungry);
}

/// Eats for one use time. The caller holds both forks.
fn dine(stage: &TableStage, actor: &Actor, session: &Session) -> Result<(), Cancelled> {
    actor.advance(ActorState::Active);
    let meals = stage.model.eat(actor.ordinal(), actor.id());
    stage.port.emit(actor, DiningPoint::Eating { meals });
    session.work()
}

/// Busy-wait until both forks are on the table.
pub(super) struct MutexDining {
    stage: TableStage,
    table: Lock<()>,
}

impl MutexDining {
    pub(super) fn new(stage: TableStage) -> Self {
        Self {
            stage,
            table: Lock::new("table", ()),
        }
    }
}

impl Protocol for MutexDining {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast(&self.stage.model)
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let model = &self.stage.model;
        let seat = actor.ordinal();
        hungry(&self.stage, actor);

        let table = spin_until(&self.table, session, |_| model.both_free(seat))?;
        let left = model.pick_up(model.left(seat), actor.id());
        let right = model.pick_up(model.right(seat), actor.id());
        drop(table);

        let outcome = dine(&self.stage, actor, session);
        drop(right);
        drop(left);
        self.stage.port.emit(actor, DiningPoint::PutDown);
        outcome?;
        rest_between(actor, session)
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![&self.table]
    }
}

/// A room of N-1 places, then left fork, then right fork.
pub(super) struct SemaphoreDining {
    stage: TableStage,
    room: Semaphore,
    forks: Vec<Semaphore>,
}

impl SemaphoreDining {
    pub(super) fn new(stage: TableStage) -> Self {
        let seats = stage.model.seats();
        let forks = forks(&stage.model);
        Self {
            stage,
            room: Semaphore::new("room", seats - 1),
            forks,
        }
    }
}

impl Protocol for SemaphoreDining {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast(&self.stage.model)
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let model = &self.stage.model;
        let seat = actor.ordinal();
        let (l, r) = (model.left(seat), model.right(seat));
        hungry(&self.stage, actor);

        {
            let _room = actor.hold(self.room.acquire(session.cancel())?);
            let _left_fork = actor.hold(self.forks[l].acquire(session.cancel())?);
            let _left = model.pick_up(l, actor.id());
            self.stage.port.emit(actor, DiningPoint::PickedUp { fork: l });
            let _right_fork = actor.hold(self.forks[r].acquire(session.cancel())?);
            let _right = model.pick_up(r, actor.id());
            self.stage.port.emit(actor, DiningPoint::PickedUp { fork: r });

            dine(&self.stage, actor, session)?;
            // Everything is released here, in reverse order
        }
        self.stage.port.emit(actor, DiningPoint::PutDown);
        rest_between(actor, session)
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        let mut all: Vec<&dyn Primitive> = vec![&self.room];
        all.extend(self.forks.iter().map(|f| f as &dyn Primitive));
        all
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Thinking,
    Hungry,
    Eating,
}

/// Hoare's monitor solution: a philosopher eats only when neither
/// neighbour does, and a neighbour putting forks down re-tests it.
pub(super) struct MonitorDining {
    stage: TableStage,
    monitor: Monitor<Vec<Phase>>,
    seats: Vec<Condition>,
}

impl MonitorDining {
    pub(super) fn new(stage: TableStage) -> Self {
        let n = stage.model.seats();
        Self {
            stage,
            monitor: Monitor::new("table", vec![Phase::Thinking; n]),
            seats: (0..n).map(|i| Condition::new(format!("self[{i}]"))).collect(),
        }
    }

    fn neighbours(&self, seat: usize) -> (usize, usize) {
        let n = self.seats.len();
        ((seat + n - 1) % n, (seat + 1) % n)
    }

    /// Lets `seat` eat if it is hungry and neither neighbour is eating.
    fn test(&self, phases: &mut [Phase], seat: usize) {
        let (left, right) = self.neighbours(seat);
        if phases[seat] == Phase::Hungry && phases[left] != Phase::Eating && phases[right] != Phase::Eating {
            phases[seat] = Phase::Eating;
            self.seats[seat].signal();
        }
    }

    fn put_down(&self, seat: usize) {
        let (left, right) = self.neighbours(seat);
        let mut phases = self.monitor.enter();
        phases[seat] = Phase::Thinking;
        self.test(&mut phases, left);
        self.test(&mut phases, right);
    }
}

impl Protocol for MonitorDining {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast(&self.stage.model)
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let model = &self.stage.model;
        let seat = actor.ordinal();
        hungry(&self.stage, actor);

        let mut phases = self.monitor.enter();
        phases[seat] = Phase::Hungry;
        self.test(&mut phases, seat);
        let phases = match self.seats[seat].wait_while(phases, session.cancel(), |p| p[seat] != Phase::Eating) {
            Ok(phases) => phases,
            Err(cancelled) => {
                // A neighbour may have granted us in the meantime
                self.put_down(seat);
                return Err(cancelled);
            }
        };
        drop(phases);

        let left = model.pick_up(model.left(seat), actor.id());
        let right = model.pick_up(model.right(seat), actor.id());
        let outcome = dine(&self.stage, actor, session);
        drop(right);
        drop(left);
        self.put_down(seat);
        self.stage.port.emit(actor, DiningPoint::PutDown);
        outcome?;
        rest_between(actor, session)
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        let mut all: Vec<&dyn Primitive> = vec![&self.monitor];
        all.extend(self.seats.iter().map(|c| c as &dyn Primitive));
        all
    }
}

/// Everyone sits down together, then tries both forks once.
pub(super) struct BarrierDining {
    stage: TableStage,
    barrier: Barrier,
    aux: Lock<()>,
}

impl BarrierDining {
    pub(super) fn new(stage: TableStage) -> Self {
        let seats = stage.model.seats();
        Self {
            stage,
            barrier: Barrier::new("seating", seats),
            aux: Lock::new("aux", ()),
        }
    }
}

impl Protocol for BarrierDining {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast(&self.stage.model)
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let model = &self.stage.model;
        let seat = actor.ordinal();
        hungry(&self.stage, actor);

        let met = self.barrier.wait(session.cancel())?;
        self.stage.port.emit(
            actor,
            DiningPoint::Rendezvous {
                generation: met.generation(),
            },
        );

        let aux = actor.hold(self.aux.lock(session.cancel())?);
        if !model.both_free(seat) {
            drop(aux);
            self.stage.port.emit(actor, DiningPoint::Skipped);
            return rest_between(actor, session);
        }
        let left = model.pick_up(model.left(seat), actor.id());
        let right = model.pick_up(model.right(seat), actor.id());
        drop(aux);

        let outcome = dine(&self.stage, actor, session);
        drop(right);
        drop(left);
        self.stage.port.emit(actor, DiningPoint::PutDown);
        outcome?;
        rest_between(actor, session)
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![&self.barrier, &self.aux]
    }
}

/// Deadlock demonstration: everyone holds the left fork before anyone
/// reaches for the right one, so every philosopher waits on a neighbour.
pub(super) struct DeadlockDining {
    stage: TableStage,
    forks: Vec<Semaphore>,
    barrier: Barrier,
}

impl DeadlockDining {
    pub(super) fn new(stage: TableStage) -> Self {
        let seats = stage.model.seats();
        let forks = forks(&stage.model);
        Self {
            stage,
            forks,
            barrier: Barrier::new("left_forks_taken", seats),
        }
    }
}

impl Protocol for DeadlockDining {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast(&self.stage.model)
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let model = &self.stage.model;
        let seat = actor.ordinal();
        let (l, r) = (model.left(seat), model.right(seat));
        hungry(&self.stage, actor);

        {
            let _left_fork = actor.hold(self.forks[l].acquire(session.cancel())?);
            let _left = model.pick_up(l, actor.id());
            self.stage.port.emit(actor, DiningPoint::PickedUp { fork: l });

            let met = self.barrier.wait(session.cancel())?;
            self.stage.port.emit(
                actor,
                DiningPoint::Rendezvous {
                    generation: met.generation(),
                },
            );

            // Held by the right-hand neighbour until stop()
            let _right_fork = actor.hold(self.forks[r].acquire(session.cancel())?);
            let _right = model.pick_up(r, actor.id());
            dine(&self.stage, actor, session)?;
        }
        self.stage.port.emit(actor, DiningPoint::PutDown);
        rest_between(actor, session)
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        let mut all: Vec<&dyn Primitive> = vec![&self.barrier];
        all.extend(self.forks.iter().map(|f| f as &dyn Primitive));
        all
    }
}
