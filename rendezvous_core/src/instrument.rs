//! Instrumentation port.
//!
//! Strategies report protocol points (a producer deposited, a fork was
//! picked up, ...) through a typed [`Port`]. Each problem has its own point
//! enum, so a display collaborator attached to the dining table can only ever
//! receive [`DiningPoint`](crate::problems::dining::DiningPoint)s.
//!
//! Delivery is synchronous on the worker thread. Listeners must be quick; a
//! listener that needs to do real work should use [`ChannelListener`] and
//! drain the receiver elsewhere.
//!
//! Workers emit only after releasing every lock, monitor or permit they do
//! not keep as part of the actor's state. Primitives the actor does keep,
//! such as forks or a writer's hold on the record, show up in
//! [`Notice::held_permits`], so a listener may read the model or call back
//! into a primitive without joining a wait-for cycle.

use crate::actor::{Actor, ActorState, Role};
use crossbeam::channel::{unbounded, Receiver, Sender};
use rendezvous_env::{ActorId, SyncContext};
use std::fmt::Debug;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// One protocol event.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice<P> {
    pub actor: ActorId,
    pub role: Role,
    /// Actor state when the point was reached
    pub state: ActorState,
    /// Primitives the actor holds as part of its observable state
    pub held_permits: usize,
    pub point: P,
    /// Context time of the event
    pub at: Duration,
}

/// Receives notices from a running strategy.
pub trait Listener<P>: Send + Sync {
    fn notify(&self, notice: &Notice<P>);
}

/// Emission handle held by a strategy's workers.
pub struct Port<P> {
    listener: Option<Arc<dyn Listener<P>>>,
    ctx: Arc<dyn SyncContext>,
}

impl<P> Clone for Port<P> {
    fn clone(&self) -> Self {
        Self {
            listener: self.listener.clone(),
            ctx: Arc::clone(&self.ctx),
        }
    }
}

impl<P: Debug> Port<P> {
    pub fn new(ctx: Arc<dyn SyncContext>, listener: Option<Arc<dyn Listener<P>>>) -> Self {
        Self { listener, ctx }
    }

    /// A port nobody listens to.
    pub fn detached(ctx: Arc<dyn SyncContext>) -> Self {
        Self::new(ctx, None)
    }

    pub fn is_attached(&self) -> bool {
        self.listener.is_some()
    }

    /// Delivers `point` for `actor`.
    ///
    /// A panicking listener is contained here so the worker keeps the
    /// primitives it holds in a consistent state.
    pub fn emit(&self, actor: &Actor, point: P) {
        let Some(listener) = &self.listener else {
            return;
        };
        let notice = Notice {
            actor: actor.id(),
            role: actor.role(),
            state: actor.state(),
            held_permits: actor.held_permits(),
            point,
            at: self.ctx.now(),
        };
        if catch_unwind(AssertUnwindSafe(|| listener.notify(&notice))).is_err() {
            tracing::warn!(actor = %notice.actor, point = ?notice.point, "listener panicked; notice dropped");
        }
    }
}

/// Forwards notices over an unbounded channel.
pub struct ChannelListener<P> {
    tx: Sender<Notice<P>>,
}

impl<P: Clone + Send> Listener<P> for ChannelListener<P> {
    fn notify(&self, notice: &Notice<P>) {
        // A dropped receiver just means nobody is watching any more
        let _ = self.tx.send(notice.clone());
    }
}

/// Creates a channel listener and the receiver that drains it.
pub fn channel<P>() -> (Arc<ChannelListener<P>>, Receiver<Notice<P>>) {
    let (tx, rx) = unbounded();
    (Arc::new(ChannelListener { tx }), rx)
}

/// Logs every notice at `trace`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl<P: Debug> Listener<P> for TracingListener {
    fn notify(&self, notice: &Notice<P>) {
        tracing::trace!(
            actor = %notice.actor,
            role = %notice.role,
            state = ?notice.state,
            point = ?notice.point,
            at_ms = notice.at.as_millis() as u64,
            "notice"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Roster;
    use rendezvous_env::SystemContext;

    #[derive(Debug, Clone, PartialEq)]
    enum Ping {
        Hello(u32),
    }

    struct Exploding;

    impl Listener<Ping> for Exploding {
        fn notify(&self, _notice: &Notice<Ping>) {
            panic!("listener bug");
        }
    }

    #[test]
    fn test_channel_listener_receives_notices() {
        let roster = Roster::new(1);
        let actor = roster.enroll(Role::Producer);
        let (listener, rx) = channel::<Ping>();
        let port = Port::new(SystemContext::shared(), Some(listener as Arc<dyn Listener<Ping>>));

        port.emit(&actor, Ping::Hello(7));
        let notice = rx.try_recv().unwrap();
        assert_eq!(notice.actor, actor.id());
        assert_eq!(notice.role, Role::Producer);
        assert_eq!(notice.point, Ping::Hello(7));
    }

    #[test]
    fn test_notice_reports_held_permits() {
        let roster = Roster::new(1);
        let actor = roster.enroll(Role::Philosopher);
        let (listener, rx) = channel::<Ping>();
        let port = Port::new(SystemContext::shared(), Some(listener as Arc<dyn Listener<Ping>>));

        let fork = actor.hold(());
        port.emit(&actor, Ping::Hello(1));
        drop(fork);
        port.emit(&actor, Ping::Hello(2));

        assert_eq!(rx.try_recv().unwrap().held_permits, 1);
        assert_eq!(rx.try_recv().unwrap().held_permits, 0);
    }

    #[test]
    fn test_detached_port_is_noop() {
        let roster = Roster::new(1);
        let actor = roster.enroll(Role::Producer);
        let port: Port<Ping> = Port::detached(SystemContext::shared());
        assert!(!port.is_attached());
        port.emit(&actor, Ping::Hello(1));
    }

    #[test]
    fn test_panicking_listener_is_contained() {
        let roster = Roster::new(1);
        let actor = roster.enroll(Role::Smoker);
        let port = Port::new(SystemContext::shared(), Some(Arc::new(Exploding) as Arc<dyn Listener<Ping>>));
        port.emit(&actor, Ping::Hello(2));
        port.emit(&actor, Ping::Hello(3));
    }

    #[test]
    fn test_send_to_dropped_receiver_is_ignored() {
        let roster = Roster::new(1);
        let actor = roster.enroll(Role::Reader);
        let (listener, rx) = channel::<Ping>();
        drop(rx);
        let port = Port::new(SystemContext::shared(), Some(listener as Arc<dyn Listener<Ping>>));
        port.emit(&actor, Ping::Hello(4));
    }
}
