use super::model::{Consultation, Ticket};
use super::{AssistantPoint, DeskModel};
use crate::actor::{Actor, ActorState, Priority, Role, Roster};
use crate::primitives::{Barrier, Condition, Lock, Monitor, Permit, Primitive, Semaphore};
use crate::problems::{join_group, leave_group, spin_until, Group, ResourceModel, Stage};
use crate::strategy::{Cast, Flow, Protocol, Session};
use rendezvous_env::Cancelled;
use std::sync::Arc;

type DeskStage = Stage<DeskModel, AssistantPoint>;

fn cast() -> Vec<Cast> {
    vec![Cast::Resident(Role::Agent), Cast::Spawner(Role::Customer)]
}

fn is_agent(actor: &Actor) -> bool {
    actor.role() == Role::Agent
}

fn arrival_priority(model: &DeskModel, session: &Session) -> Priority {
    if session.chance(model.config().high_priority_share) {
        Priority::High
    } else {
        Priority::Normal
    }
}

/// Registers the request. Every desk notice goes out after the caller has
/// released the primitive it decided under.
fn queue<'a>(model: &'a DeskModel, actor: &Actor) -> Ticket<'a> {
    actor.advance(ActorState::Waiting);
    model.queue(actor.priority())
}

fn queued(stage: &DeskStage, actor: &Actor) {
    stage.port.emit(
        actor,
        AssistantPoint::Queued {
            priority: actor.priority(),
        },
    );
}

fn admit<'a>(model: &'a DeskModel, actor: &Actor, ticket: Ticket<'a>) -> Consultation<'a> {
    let consultation = model.admit(ticket, actor.id());
    actor.advance(ActorState::Active);
    consultation
}

fn admitted(stage: &DeskStage, actor: &Actor, consultation: &Consultation<'_>) {
    stage.port.emit(
        actor,
        AssistantPoint::Admitted {
            assistant: consultation.assistant(),
            priority: actor.priority(),
        },
    );
}

fn leave(stage: &DeskStage, actor: &Actor) -> Flow {
    actor.advance(ActorState::Leaving);
    stage.port.emit(actor, AssistantPoint::Finished);
    Flow::Retire
}

/// Adds a token if the bucket has room. Returns the new level.
fn refill(model: &DeskModel, actor: &Actor) -> Option<usize> {
    actor.advance(ActorState::Active);
    model.refill()
}

fn refilled(stage: &DeskStage, actor: &Actor, tokens: Option<usize>) {
    if let Some(tokens) = tokens {
        stage.port.emit(actor, AssistantPoint::Refilled { tokens });
    }
}

/// The agent sleeps on the refill clock rather than resting between rounds.
fn settle(actor: &Actor) -> Flow {
    actor.advance(ActorState::Leaving);
    actor.advance(ActorState::Idle);
    Flow::Continue
}

/// Busy-wait on tokens, assistants and the priority rule under one lock.
pub(super) struct MutexAssistants {
    stage: DeskStage,
    desk: Lock<()>,
}

impl MutexAssistants {
    pub(super) fn new(stage: DeskStage) -> Self {
        Self {
            stage,
            desk: Lock::new("desk", ()),
        }
    }
}

impl Protocol for MutexAssistants {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast()
    }

    fn arrival_priority(&self, session: &Session) -> Priority {
        arrival_priority(&self.stage.model, session)
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let model = &self.stage.model;
        if is_agent(actor) {
            session.refill()?;
            actor.advance(ActorState::Waiting);
            let desk = actor.hold(self.desk.lock(session.cancel())?);
            let tokens = refill(model, actor);
            drop(desk);
            refilled(&self.stage, actor, tokens);
            return Ok(settle(actor));
        }

        let ticket = {
            let _desk = self.desk.lock(session.cancel())?;
            queue(model, actor)
        };
        queued(&self.stage, actor);
        let desk = spin_until(&self.desk, session, |_| model.can_admit(actor.priority()))?;
        let consultation = admit(model, actor, ticket);
        drop(desk);
        admitted(&self.stage, actor, &consultation);
        let outcome = session.work();
        drop(consultation);
        outcome?;
        Ok(leave(&self.stage, actor))
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![&self.desk]
    }
}

/// `tokens` and `slots` semaphores, with a turnstile that the High group
/// holds while any High request is queued.
///
/// A Normal request passes the turnstile and keeps it until admitted, so a
/// High request can only register once no Normal request is mid-admission.
pub(super) struct SemaphoreAssistants {
    stage: DeskStage,
    tokens: Semaphore,
    slots: Semaphore,
    turnstile: Arc<Semaphore>,
    high: Lock<Group>,
}

impl SemaphoreAssistants {
    pub(super) fn new(stage: DeskStage) -> Self {
        let tokens = stage.model.tokens();
        let assistants = stage.model.assistants();
        Self {
            stage,
            tokens: Semaphore::new("tokens", tokens),
            slots: Semaphore::new("slots", assistants),
            turnstile: Arc::new(Semaphore::new("turnstile", 1)),
            high: Lock::new("high_count", Group::default()),
        }
    }

    /// Takes a token, then an assistant slot.
    fn reserve(&self, session: &Session) -> Result<(Permit<'_>, Permit<'_>), Cancelled> {
        let token = self.tokens.acquire(session.cancel())?;
        let slot = self.slots.acquire(session.cancel())?;
        Ok((token, slot))
    }

    fn high(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let model = &self.stage.model;
        join_group(&self.high, &self.turnstile, session)?;
        let ticket = queue(model, actor);
        queued(&self.stage, actor);
        let granted = match self.reserve(session) {
            Ok((token, slot)) => {
                let consultation = admit(model, actor, ticket);
                token.consume();
                Ok((consultation, slot))
            }
            Err(cancelled) => {
                // Deregister before the group can hand the turnstile over
                drop(ticket);
                Err(cancelled)
            }
        };
        leave_group(&self.high);
        let (consultation, slot) = granted?;

        let slot = actor.hold(slot);
        admitted(&self.stage, actor, &consultation);
        let outcome = session.work();
        drop(consultation);
        drop(slot);
        outcome?;
        Ok(leave(&self.stage, actor))
    }

    fn normal(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let model = &self.stage.model;
        let ticket = queue(model, actor);
        queued(&self.stage, actor);
        let turnstile = actor.hold(self.turnstile.acquire(session.cancel())?);
        let (token, slot) = self.reserve(session)?;
        let consultation = admit(model, actor, ticket);
        token.consume();
        drop(turnstile);

        let slot = actor.hold(slot);
        admitted(&self.stage, actor, &consultation);
        let outcome = session.work();
        drop(consultation);
        drop(slot);
        outcome?;
        Ok(leave(&self.stage, actor))
    }
}

impl Protocol for SemaphoreAssistants {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast()
    }

    fn arrival_priority(&self, session: &Session) -> Priority {
        arrival_priority(&self.stage.model, session)
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        if is_agent(actor) {
            session.refill()?;
            actor.advance(ActorState::Waiting);
            let tokens = refill(&self.stage.model, actor);
            refilled(&self.stage, actor, tokens);
            if tokens.is_some() {
                self.tokens.signal();
            }
            return Ok(settle(actor));
        }
        match actor.priority() {
            Priority::High => self.high(actor, session),
            Priority::Normal => self.normal(actor, session),
        }
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![&self.tokens, &self.slots, self.turnstile.as_ref(), &self.high]
    }
}

/// One `admit` condition whose predicate carries the priority rule.
pub(super) struct MonitorAssistants {
    stage: DeskStage,
    monitor: Monitor<()>,
    admit: Condition,
}

impl MonitorAssistants {
    pub(super) fn new(stage: DeskStage) -> Self {
        Self {
            stage,
            monitor: Monitor::new("desk", ()),
            admit: Condition::new("admit"),
        }
    }
}

impl Protocol for MonitorAssistants {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast()
    }

    fn arrival_priority(&self, session: &Session) -> Priority {
        arrival_priority(&self.stage.model, session)
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let model = &self.stage.model;
        if is_agent(actor) {
            session.refill()?;
            actor.advance(ActorState::Waiting);
            let inside = self.monitor.enter();
            let tokens = refill(model, actor);
            if tokens.is_some() {
                self.admit.broadcast();
            }
            drop(inside);
            refilled(&self.stage, actor, tokens);
            return Ok(settle(actor));
        }

        let inside = self.monitor.enter();
        let ticket = queue(model, actor);
        drop(inside);
        queued(&self.stage, actor);

        let inside = self.monitor.enter();
        let inside = self
            .admit
            .wait_while(inside, session.cancel(), |_| !model.can_admit(actor.priority()))?;
        let consultation = admit(model, actor, ticket);
        // A High admission may unblock Normal requests
        self.admit.broadcast();
        drop(inside);
        admitted(&self.stage, actor, &consultation);

        let outcome = session.work();
        let inside = self.monitor.enter();
        drop(consultation);
        self.admit.broadcast();
        drop(inside);
        outcome?;
        Ok(leave(&self.stage, actor))
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![&self.monitor, &self.admit]
    }
}

/// Requests meet in batches of K, then try admission one by one under an
/// auxiliary lock. Whoever is not admitted rejoins the next batch.
pub(super) struct BarrierAssistants {
    stage: DeskStage,
    batch: Barrier,
    aux: Lock<()>,
}

impl BarrierAssistants {
    pub(super) fn new(stage: DeskStage) -> Self {
        let assistants = stage.model.assistants();
        Self {
            stage,
            batch: Barrier::new("batch", assistants),
            aux: Lock::new("aux", ()),
        }
    }

    fn meet(&self, actor: &Actor, session: &Session) -> Result<(), Cancelled> {
        let met = self.batch.wait(session.cancel())?;
        self.stage.port.emit(
            actor,
            AssistantPoint::Rendezvous {
                generation: met.generation(),
            },
        );
        Ok(())
    }
}

impl Protocol for BarrierAssistants {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast()
    }

    fn arrival_priority(&self, session: &Session) -> Priority {
        arrival_priority(&self.stage.model, session)
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let model = &self.stage.model;
        if is_agent(actor) {
            session.refill()?;
            actor.advance(ActorState::Waiting);
            let aux = actor.hold(self.aux.lock(session.cancel())?);
            let tokens = refill(model, actor);
            drop(aux);
            refilled(&self.stage, actor, tokens);
            return Ok(settle(actor));
        }

        let ticket = {
            let _aux = self.aux.lock(session.cancel())?;
            queue(model, actor)
        };
        queued(&self.stage, actor);
        loop {
            self.meet(actor, session)?;
            let aux = actor.hold(self.aux.lock(session.cancel())?);
            if model.can_admit(actor.priority()) {
                let consultation = admit(model, actor, ticket);
                drop(aux);
                admitted(&self.stage, actor, &consultation);
                let outcome = session.work();
                drop(consultation);
                outcome?;
                return Ok(leave(&self.stage, actor));
            }
            drop(aux);
            session.retry()?;
        }
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![&self.batch, &self.aux]
    }
}
