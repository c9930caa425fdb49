use super::{BarberPoint, ShopModel};
use crate::actor::{Actor, ActorState, Role, Roster};
use crate::primitives::{Barrier, Condition, Lock, Monitor, Primitive, Semaphore};
use crate::problems::{rest_between, spin_until, Claim, ResourceModel, Stage};
use crate::strategy::{Cast, Flow, Protocol, Session};
use rendezvous_env::{ActorId, Cancelled};
use std::collections::VecDeque;

type ShopStage = Stage<ShopModel, BarberPoint>;

fn cast() -> Vec<Cast> {
    vec![Cast::Resident(Role::Barber), Cast::Spawner(Role::Customer)]
}

fn is_barber(actor: &Actor) -> bool {
    actor.role() == Role::Barber
}

/// Seats an arriving customer, or turns it away when every seat is taken.
fn arrive<'a>(model: &'a ShopModel, actor: &Actor) -> Option<Claim<'a>> {
    let seat = model.take_seat(actor.id());
    if seat.is_some() {
        actor.advance(ActorState::Waiting);
    }
    seat
}

/// Reports what [`arrive`] decided, once the shop is released.
fn announce(stage: &ShopStage, actor: &Actor, seat: Option<&Claim<'_>>) {
    let point = match seat {
        Some(seat) => BarberPoint::Seated { seat: seat.index() },
        None => BarberPoint::TurnedAway,
    };
    stage.port.emit(actor, point);
}

fn leave(stage: &ShopStage, actor: &Actor) -> Result<Flow, Cancelled> {
    actor.advance(ActorState::Leaving);
    stage.port.emit(actor, BarberPoint::Left);
    Ok(Flow::Retire)
}

fn doze(stage: &ShopStage, actor: &Actor) {
    actor.advance(ActorState::Waiting);
    if stage.model.waiting() == 0 {
        stage.port.emit(actor, BarberPoint::Sleeping);
    }
}

/// Cuts for one use time. Someone is in the chair.
fn cut(stage: &ShopStage, actor: &Actor, session: &Session) -> Result<(), Cancelled> {
    actor.advance(ActorState::Active);
    let haircut = stage.model.begin_cut();
    stage.port.emit(actor, BarberPoint::CutStarted);
    let outcome = session.work();
    drop(haircut);
    stage.port.emit(
        actor,
        BarberPoint::CutFinished {
            served: stage.model.served(),
        },
    );
    outcome
}

/// Waiting room, chair call and finished cut, shared by the lock-based
/// protocols.
#[derive(Default)]
struct Shop {
    queue: VecDeque<ActorId>,
    called: Option<ActorId>,
    occupant: Option<ActorId>,
    finished: Option<ActorId>,
}

/// Busy-wait handshake over the shop state.
pub(super) struct MutexBarber {
    stage: ShopStage,
    shop: Lock<Shop>,
}

impl MutexBarber {
    pub(super) fn new(stage: ShopStage) -> Self {
        Self {
            stage,
            shop: Lock::new("shop", Shop::default()),
        }
    }

    fn barber(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        doze(&self.stage, actor);
        let mut shop = spin_until(&self.shop, session, |s| !s.queue.is_empty() && s.occupant.is_none())?;
        let Some(next) = shop.queue.pop_front() else {
            drop(shop);
            return rest_between(actor, session);
        };
        shop.called = Some(next);
        drop(shop);

        let shop = spin_until(&self.shop, session, |s| s.occupant == Some(next))?;
        drop(shop);
        let outcome = cut(&self.stage, actor, session);

        let mut shop = self.shop.lock_for_release();
        shop.called = None;
        shop.finished = Some(next);
        drop(shop);
        outcome?;
        rest_between(actor, session)
    }

    fn customer(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let me = actor.id();
        let mut shop = self.shop.lock(session.cancel())?;
        let seat = arrive(&self.stage.model, actor);
        if seat.is_some() {
            shop.queue.push_back(me);
        }
        drop(shop);
        announce(&self.stage, actor, seat.as_ref());
        let Some(seat) = seat else {
            return leave(&self.stage, actor);
        };

        let mut shop = spin_until(&self.shop, session, |s| s.called == Some(me))?;
        let chair = self.stage.model.sit_in_chair(me);
        drop(seat);
        shop.occupant = Some(me);
        drop(shop);
        actor.advance(ActorState::Active);
        self.stage.port.emit(actor, BarberPoint::InChair);

        let mut shop = spin_until(&self.shop, session, |s| s.finished == Some(me))?;
        drop(chair);
        shop.occupant = None;
        drop(shop);
        leave(&self.stage, actor)
    }
}

impl Protocol for MutexBarber {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast()
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        if is_barber(actor) {
            self.barber(actor, session)
        } else {
            self.customer(actor, session)
        }
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![&self.shop]
    }
}

/// The textbook semaphore handshake.
pub(super) struct SemaphoreBarber {
    stage: ShopStage,
    customers: Semaphore,
    barber_ready: Semaphore,
    seated: Semaphore,
    cut_done: Semaphore,
    vacated: Semaphore,
    seat_guard: Lock<()>,
}

impl SemaphoreBarber {
    pub(super) fn new(stage: ShopStage) -> Self {
        Self {
            stage,
            customers: Semaphore::new("customers", 0),
            barber_ready: Semaphore::new("barber_ready", 0),
            seated: Semaphore::new("seated", 0),
            cut_done: Semaphore::new("cut_done", 0),
            vacated: Semaphore::new("vacated", 0),
            seat_guard: Lock::new("seat_guard", ()),
        }
    }

    fn barber(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        doze(&self.stage, actor);
        self.customers.wait(session.cancel())?;
        self.barber_ready.signal();
        self.seated.wait(session.cancel())?;

        let outcome = cut(&self.stage, actor, session);
        self.cut_done.signal();
        outcome?;
        self.vacated.wait(session.cancel())?;
        rest_between(actor, session)
    }

    fn customer(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let seat = {
            let _guard = actor.hold(self.seat_guard.lock(session.cancel())?);
            arrive(&self.stage.model, actor)
        };
        announce(&self.stage, actor, seat.as_ref());
        let Some(seat) = seat else {
            return leave(&self.stage, actor);
        };
        self.customers.signal();
        self.barber_ready.wait(session.cancel())?;

        let chair = self.stage.model.sit_in_chair(actor.id());
        drop(seat);
        actor.advance(ActorState::Active);
        self.stage.port.emit(actor, BarberPoint::InChair);
        self.seated.signal();

        let outcome = self.cut_done.wait(session.cancel());
        drop(chair);
        self.vacated.signal();
        outcome?;
        leave(&self.stage, actor)
    }
}

impl Protocol for SemaphoreBarber {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast()
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        if is_barber(actor) {
            self.barber(actor, session)
        } else {
            self.customer(actor, session)
        }
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![
            &self.customers,
            &self.barber_ready,
            &self.seated,
            &self.cut_done,
            &self.vacated,
            &self.seat_guard,
        ]
    }
}

/// Monitor with `customer_waiting`, `chair_called` and `cut_finished`.
pub(super) struct MonitorBarber {
    stage: ShopStage,
    monitor: Monitor<Shop>,
    customer_waiting: Condition,
    chair_called: Condition,
    cut_finished: Condition,
}

impl MonitorBarber {
    pub(super) fn new(stage: ShopStage) -> Self {
        Self {
            stage,
            monitor: Monitor::new("shop", Shop::default()),
            customer_waiting: Condition::new("customer_waiting"),
            chair_called: Condition::new("chair_called"),
            cut_finished: Condition::new("cut_finished"),
        }
    }

    fn barber(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        doze(&self.stage, actor);
        let shop = self.monitor.enter();
        let mut shop = self.customer_waiting.wait_while(shop, session.cancel(), |s| {
            s.queue.is_empty() || s.occupant.is_some()
        })?;
        let Some(next) = shop.queue.pop_front() else {
            drop(shop);
            return rest_between(actor, session);
        };
        shop.called = Some(next);
        self.chair_called.broadcast();

        // The called customer reports through the same condition
        let shop = self
            .customer_waiting
            .wait_while(shop, session.cancel(), |s| s.occupant != Some(next))?;
        drop(shop);
        let outcome = cut(&self.stage, actor, session);

        let mut shop = self.monitor.enter();
        shop.called = None;
        shop.finished = Some(next);
        self.cut_finished.broadcast();
        drop(shop);
        outcome?;
        rest_between(actor, session)
    }

    fn customer(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let me = actor.id();
        let mut shop = self.monitor.enter();
        let seat = arrive(&self.stage.model, actor);
        if seat.is_some() {
            shop.queue.push_back(me);
            self.customer_waiting.signal();
        }
        drop(shop);
        announce(&self.stage, actor, seat.as_ref());
        let Some(seat) = seat else {
            return leave(&self.stage, actor);
        };

        // A call made while the notice went out is still pending in `called`
        let shop = self.monitor.enter();
        let mut shop = self
            .chair_called
            .wait_while(shop, session.cancel(), |s| s.called != Some(me))?;
        let chair = self.stage.model.sit_in_chair(me);
        drop(seat);
        shop.occupant = Some(me);
        self.customer_waiting.signal();
        drop(shop);
        actor.advance(ActorState::Active);
        self.stage.port.emit(actor, BarberPoint::InChair);

        let shop = self.monitor.enter();
        let mut shop = self
            .cut_finished
            .wait_while(shop, session.cancel(), |s| s.finished != Some(me))?;
        drop(chair);
        shop.occupant = None;
        self.customer_waiting.signal();
        drop(shop);
        leave(&self.stage, actor)
    }
}

impl Protocol for MonitorBarber {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast()
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        if is_barber(actor) {
            self.barber(actor, session)
        } else {
            self.customer(actor, session)
        }
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![
            &self.monitor,
            &self.customer_waiting,
            &self.chair_called,
            &self.cut_finished,
        ]
    }
}

/// The customer holding the FIFO chair token meets the barber twice: once
/// to start the cut and once to end it.
pub(super) struct BarrierBarber {
    stage: ShopStage,
    chair_token: Semaphore,
    barrier: Barrier,
}

impl BarrierBarber {
    pub(super) fn new(stage: ShopStage) -> Self {
        Self {
            stage,
            chair_token: Semaphore::new("chair_token", 1),
            barrier: Barrier::new("handshake", 2),
        }
    }

    fn meet(&self, actor: &Actor, session: &Session) -> Result<(), Cancelled> {
        let met = self.barrier.wait(session.cancel())?;
        self.stage.port.emit(
            actor,
            BarberPoint::Rendezvous {
                generation: met.generation(),
            },
        );
        Ok(())
    }

    fn barber(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        doze(&self.stage, actor);
        self.meet(actor, session)?;
        cut(&self.stage, actor, session)?;
        self.meet(actor, session)?;
        rest_between(actor, session)
    }

    fn customer(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        let seat = arrive(&self.stage.model, actor);
        announce(&self.stage, actor, seat.as_ref());
        let Some(seat) = seat else {
            return leave(&self.stage, actor);
        };
        let token = actor.hold(self.chair_token.acquire(session.cancel())?);
        let chair = self.stage.model.sit_in_chair(actor.id());
        drop(seat);
        actor.advance(ActorState::Active);
        self.stage.port.emit(actor, BarberPoint::InChair);

        self.meet(actor, session)?;
        self.meet(actor, session)?;
        drop(chair);
        drop(token);
        leave(&self.stage, actor)
    }
}

impl Protocol for BarrierBarber {
    fn roster(&self) -> &Roster {
        self.stage.model.roster()
    }

    fn cast(&self) -> Vec<Cast> {
        cast()
    }

    fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
        if is_barber(actor) {
            self.barber(actor, session)
        } else {
            self.customer(actor, session)
        }
    }

    fn primitives(&self) -> Vec<&dyn Primitive> {
        vec![&self.chair_token, &self.barrier]
    }
}
