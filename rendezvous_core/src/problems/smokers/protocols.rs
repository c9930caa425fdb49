use super::{Ingredient, SmokerPoint, SmokersModel};
use crate::actor::{Actor, ActorState, Role, Roster};
use crate::primitives::{Barrier, Condition, Lock, Monitor, Primitive, Semaphore};
use crate::problems::{rest_between, spin_until, ResourceModel, Stage};
use crate::strategy::{Cast, Flow, Protocol, Session};
use rendezvous_env::Cancelled;

type TableStage = Stage<SmokersModel, SmokerPoint>;

fn cast() -> Vec<Cast> {
    vec![
        Cast::Resident(Role::Agent),
        Cast::Resident(Role::Smoker),
        Cast::Resident(Role::Smoker),
        Cast::Resident(Role::Smoker),
    ]
}

fn is_agent(actor: &Actor) -> bool {
    actor.role() == Role::Agent
}

/// The ingredient a smoker always has.
fn supply(actor: &Actor) -> Ingredient {
    Ingredient::from_index(actor.ordinal())
}

/// Puts two random ingredients on the table. Returns the one left out,
/// for the caller to report once the table is released.
fn place(model: &SmokersModel, actor: &Actor, session: &Session) -> Ingredient {
    actor.advance(ActorState::Active);
    let missing = Ingredient::from_index(session.pick(3));
    model.place(missing);
    missing
}

fn placed(stage: &TableStage, actor: &Actor, missing: Ingredient) {
    stage.port.emit(actor, SmokerPoint::Placed { missing });
}

/// Takes the pair this smoker lacks. Returns the smoker's own supply.
fn take(model: &SmokersModel, actor: &Actor) -> Ingredient {
    let mine = supply(actor);
    model.take(mine);
    mine
}

fn took(stage: &TableStage, actor: &Actor, smoker: Ingredient) {
    stage.port.emit(actor, SmokerPoint::Took { smoker });
}

fn smoke(stage: &TableStage, actor: &Actor, session: &Session) -> Result<(), Cancelled> {
    actor.advance(ActorState::Active);
    stage.port.emit(actor, SmokerPoint::Smoking);
    session.work()
}

/// Busy-wait for an empty table (agent) or a matching pair (smokers).
pub(super) struct MutexSmokers {
    stage: TableStage,
    table: Lock<()>,
}

impl MutexSmokers {
    pub(super) fn new(stage: TableStage) -> Self {
        Self {
            stage,
            table: Lock::new("table", ()),
        }
    }
}

impl Protocol for MutexSmokers {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast()
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let model = &self.stage.model;
        actor.advance(ActorState::Waiting);
        if is_agent(actor) {
            let table = spin_until(&self.table, session, |_| model.is_empty())?;
            let missing = place(model, actor, session);
            drop(table);
            placed(&self.stage, actor, missing);
        } else {
            let mine = supply(actor);
            let table = spin_until(&self.table, session, |_| model.ready_for(mine))?;
            take(model, actor);
            drop(table);
            took(&self.stage, actor, mine);
            smoke(&self.stage, actor, session)?;
        }
        rest_between(actor, session)
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![&self.table]
    }
}

/// Agent gate plus one wake-up semaphore per smoker.
pub(super) struct SemaphoreSmokers {
    stage: TableStage,
    agent_gate: Semaphore,
    wake: [Semaphore; 3],
}

impl SemaphoreSmokers {
    pub(super) fn new(stage: TableStage) -> Self {
        Self {
            stage,
            agent_gate: Semaphore::new("agent", 1),
            wake: [
                Semaphore::new("tobacco_smoker", 0),
                Semaphore::new("paper_smoker", 0),
                Semaphore::new("matches_smoker", 0),
            ],
        }
    }
}

impl Protocol for SemaphoreSmokers {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast()
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        actor.advance(ActorState::Waiting);
        if is_agent(actor) {
            self.agent_gate.wait(session.cancel())?;
            let missing = place(&self.stage.model, actor, session);
            placed(&self.stage, actor, missing);
            self.wake[missing.index()].signal();
        } else {
            self.wake[supply(actor).index()].wait(session.cancel())?;
            let mine = take(&self.stage.model, actor);
            took(&self.stage, actor, mine);
            self.agent_gate.signal();
            smoke(&self.stage, actor, session)?;
        }
        rest_between(actor, session)
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        let mut all: Vec<&dyn Primitive> = vec![&self.agent_gate];
        all.extend(self.wake.iter().map(|s| s as &dyn Primitive));
        all
    }
}

/// Monitor with `table_empty` and `ingredients_ready`.
pub(super) struct MonitorSmokers {
    stage: TableStage,
    monitor: Monitor<()>,
    table_empty: Condition,
    ingredients_ready: Condition,
}

impl MonitorSmokers {
    pub(super) fn new(stage: TableStage) -> Self {
        Self {
            stage,
            monitor: Monitor::new("table", ()),
            table_empty: Condition::new("table_empty"),
            ingredients_ready: Condition::new("ingredients_ready"),
        }
    }
}

impl Protocol for MonitorSmokers {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast()
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let model = &self.stage.model;
        actor.advance(ActorState::Waiting);
        let inside = self.monitor.enter();
        if is_agent(actor) {
            let inside = self
                .table_empty
                .wait_while(inside, session.cancel(), |_| !model.is_empty())?;
            let missing = place(model, actor, session);
            // Only the matching smoker can proceed; wake all to find it
            self.ingredients_ready.broadcast();
            drop(inside);
            placed(&self.stage, actor, missing);
        } else {
            let mine = supply(actor);
            let inside = self
                .ingredients_ready
                .wait_while(inside, session.cancel(), |_| !model.ready_for(mine))?;
            take(model, actor);
            self.table_empty.signal();
            drop(inside);
            took(&self.stage, actor, mine);
            smoke(&self.stage, actor, session)?;
        }
        rest_between(actor, session)
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![&self.monitor, &self.table_empty, &self.ingredients_ready]
    }
}

/// Agent and smokers meet after every placement and after every take.
pub(super) struct BarrierSmokers {
    stage: TableStage,
    barrier: Barrier,
    aux: Lock<()>,
}

impl BarrierSmokers {
    pub(super) fn new(stage: TableStage) -> Self {
        Self {
            stage,
            barrier: Barrier::new("table", 4),
            aux: Lock::new("aux", ()),
        }
    }

    fn meet(&self, actor: &Actor, session: &Session) -> Result<(), Cancelled> {
        let met = self.barrier.wait(session.cancel())?;
        self.stage.port.emit(
            actor,
            SmokerPoint::Rendezvous {
                generation: met.generation(),
            },
        );
        Ok(())
    }
}

impl Protocol for BarrierSmokers {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast()
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let model = &self.stage.model;
        actor.advance(ActorState::Waiting);
        if is_agent(actor) {
            let aux = actor.hold(self.aux.lock(session.cancel())?);
            let missing = model.is_empty().then(|| place(model, actor, session));
            drop(aux);
            if let Some(missing) = missing {
                placed(&self.stage, actor, missing);
            }
            actor.advance(ActorState::Leaving);
            self.meet(actor, session)?;
            self.meet(actor, session)?;
        } else {
            self.meet(actor, session)?;
            let aux = actor.hold(self.aux.lock(session.cancel())?);
            let taken = model.ready_for(supply(actor)).then(|| take(model, actor));
            drop(aux);
            if let Some(mine) = taken {
                took(&self.stage, actor, mine);
                smoke(&self.stage, actor, session)?;
            }
            actor.advance(ActorState::Leaving);
            self.meet(actor, session)?;
        }
        rest_between(actor, session)
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![&self.barrier, &self.aux]
    }
}
