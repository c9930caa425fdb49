//! Generic cancellable worker runner.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── Runner<P> ─────────────────────────────┐
//! │  start(): build P ─► enroll residents ─► spawn one thread per Cast │
//! │                                                                    │
//! │   Resident(role)                 Spawner(role)                     │
//! │   loop { P::round() }            loop { arrival gap                │
//! │     until Retire/Cancelled              roster.admit() ─► thread:  │
//! │                                         P::round() once }          │
//! │                                                                    │
//! │  stop(): cancel ─► join residents/spawners ─► join spawned actors  │
//! │          ─► audit P::primitives() ─► clear roster ─► drop P        │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The protocol value lives exactly as long as one run, so a restarted
//! strategy always starts from freshly allocated primitives.

use crate::actor::{Actor, ActorState, Role};
use crate::config::Timing;
use crate::error::SyncError;
use crate::primitives::{guard, PrimitiveStatus};
use crate::problem::{Discipline, Problem};
use crate::strategy::{Cast, Flow, Protocol, Session, StopReport, Strategy};
use rendezvous_env::{CancelToken, RunId, SyncContext};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn, Span};

/// Runs a [`Protocol`] on OS threads. Implements [`Strategy`].
pub struct Runner<P: Protocol> {
    problem: Problem,
    discipline: Discipline,
    ctx: Arc<dyn SyncContext>,
    timing: Timing,
    build: Box<dyn Fn() -> P + Send>,
    run: Option<Run<P>>,
    last_run: Option<RunId>,
}

/// State of one start/stop cycle.
struct Run<P> {
    id: RunId,
    protocol: Arc<P>,
    cancel: CancelToken,
    workers: Vec<JoinHandle<()>>,
    crew: Arc<Crew>,
    started: Duration,
    span: Span,
}

/// Threads spawned for short-lived actors, shared with the spawners.
#[derive(Default)]
struct Crew {
    spawned: Mutex<Vec<JoinHandle<()>>>,
    joined: AtomicUsize,
    panicked: AtomicUsize,
}

impl Crew {
    fn adopt(&self, handle: JoinHandle<()>) {
        guard(&self.spawned).push(handle);
    }

    /// Joins spawned actors that already finished.
    fn reap(&self) {
        let finished: Vec<JoinHandle<()>> = {
            let mut spawned = guard(&self.spawned);
            let (done, running) = spawned.drain(..).partition(|h| h.is_finished());
            *spawned = running;
            done
        };
        for handle in finished {
            self.join(handle);
        }
    }

    fn join_all(&self) {
        let remaining = std::mem::take(&mut *guard(&self.spawned));
        for handle in remaining {
            self.join(handle);
        }
    }

    fn join(&self, handle: JoinHandle<()>) {
        self.joined.fetch_add(1, Ordering::SeqCst);
        if handle.join().is_err() {
            self.panicked.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl<P: Protocol> Runner<P> {
    /// Creates a stopped runner. `build` is called on every `start`.
    pub fn new(
        problem: Problem,
        discipline: Discipline,
        ctx: Arc<dyn SyncContext>,
        timing: Timing,
        build: impl Fn() -> P + Send + 'static,
    ) -> Self {
        Self {
            problem,
            discipline,
            ctx,
            timing,
            build: Box::new(build),
            run: None,
            last_run: None,
        }
    }

    /// The running protocol, if any.
    pub fn protocol(&self) -> Option<&P> {
        self.run.as_ref().map(|r| r.protocol.as_ref())
    }

    fn launch(&self, run: &mut Run<P>, session: &Session) -> Result<(), SyncError> {
        for (n, cast) in run.protocol.cast().into_iter().enumerate() {
            let handle = match cast {
                Cast::Resident(role) => {
                    let actor = run.protocol.roster().enroll(role);
                    let name = format!("{}-{}-{}", self.problem, role, actor.ordinal());
                    let protocol = Arc::clone(&run.protocol);
                    let session = session.clone();
                    let span = run.span.clone();
                    thread::Builder::new().name(name).spawn(move || {
                        let _entered = span.enter();
                        run_actor(protocol.as_ref(), &actor, &session);
                    })
                }
                Cast::Spawner(role) => {
                    let name = format!("{}-{}-spawner-{}", self.problem, role, n);
                    let protocol = Arc::clone(&run.protocol);
                    let session = session.clone();
                    let crew = Arc::clone(&run.crew);
                    let span = run.span.clone();
                    thread::Builder::new().name(name).spawn(move || {
                        let _entered = span.enter();
                        run_spawner(protocol, role, session, crew, span.clone());
                    })
                }
            };
            run.workers.push(handle.map_err(SyncError::Spawn)?);
        }
        Ok(())
    }

    fn teardown(&self, run: Run<P>) -> StopReport {
        let _entered = run.span.enter();
        run.cancel.cancel();

        let mut joined = 0;
        let mut panicked = 0;
        for handle in run.workers {
            joined += 1;
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        // Spawners are gone, so nothing adds to the crew any more
        run.crew.join_all();
        joined += run.crew.joined.load(Ordering::SeqCst);
        panicked += run.crew.panicked.load(Ordering::SeqCst);

        let primitives: Vec<PrimitiveStatus> = run
            .protocol
            .primitives()
            .into_iter()
            .map(PrimitiveStatus::of)
            .collect();
        run.protocol.roster().clear();

        let report = StopReport {
            run_id: Some(run.id),
            workers_joined: joined,
            panicked,
            primitives,
            elapsed: self.ctx.now().saturating_sub(run.started),
        };
        if report.is_clean() {
            info!(workers = joined, elapsed_ms = report.elapsed.as_millis() as u64, "strategy stopped");
        } else {
            let leaks: Vec<&str> = report.leaks().map(|p| p.name.as_str()).collect();
            warn!(workers = joined, panicked, ?leaks, "strategy stopped uncleanly");
        }
        report
    }
}

impl<P: Protocol> Strategy for Runner<P> {
    fn problem(&self) -> Problem {
        self.problem
    }

    fn discipline(&self) -> Discipline {
        self.discipline
    }

    fn start(&mut self) -> Result<(), SyncError> {
        if self.run.is_some() {
            return Ok(());
        }
        let id = self.ctx.next_run_id();
        let span = tracing::info_span!(
            "run",
            run_id = %id,
            problem = %self.problem,
            discipline = %self.discipline
        );
        let cancel = CancelToken::new();
        let session = Session::new(Arc::clone(&self.ctx), cancel.clone(), self.timing.clone());
        let mut run = Run {
            id,
            protocol: Arc::new((self.build)()),
            cancel,
            workers: Vec::new(),
            crew: Arc::new(Crew::default()),
            started: self.ctx.now(),
            span,
        };

        if let Err(e) = self.launch(&mut run, &session) {
            warn!(error = %e, "start failed; tearing down partial run");
            self.teardown(run);
            return Err(e);
        }
        {
            let _entered = run.span.enter();
            info!(workers = run.workers.len(), "strategy started");
        }
        self.last_run = Some(id);
        self.run = Some(run);
        Ok(())
    }

    fn stop(&mut self) -> StopReport {
        match self.run.take() {
            Some(run) => self.teardown(run),
            None => StopReport::idle(),
        }
    }

    fn is_running(&self) -> bool {
        self.run.is_some()
    }

    fn run_id(&self) -> Option<RunId> {
        self.last_run
    }
}

impl<P: Protocol> Drop for Runner<P> {
    fn drop(&mut self) {
        if let Some(run) = self.run.take() {
            self.teardown(run);
        }
    }
}

/// Boxes a runner as a [`Strategy`] trait object.
pub fn boxed<P: Protocol>(
    problem: Problem,
    discipline: Discipline,
    ctx: Arc<dyn SyncContext>,
    timing: Timing,
    build: impl Fn() -> P + Send + 'static,
) -> Box<dyn Strategy> {
    Box::new(Runner::new(problem, discipline, ctx, timing, build))
}

/// Worker loop of one actor.
fn run_actor<P: Protocol>(protocol: &P, actor: &Actor, session: &Session) {
    debug!(actor = %actor.id(), role = %actor.role(), ordinal = actor.ordinal(), "worker started");
    let mut rounds = 0u64;
    while !session.cancel().is_cancelled() {
        match protocol.round(actor, session) {
            Ok(Flow::Continue) => rounds += 1,
            Ok(Flow::Retire) => {
                rounds += 1;
                break;
            }
            Err(_) => break,
        }
    }
    actor.advance(ActorState::Done);
    protocol.roster().retire(actor.id());
    debug!(actor = %actor.id(), rounds, "worker exited");
}

/// Admits a new actor every arrival gap and runs it on its own thread.
fn run_spawner<P: Protocol>(protocol: Arc<P>, role: Role, session: Session, crew: Arc<Crew>, span: Span) {
    debug!(%role, "spawner started");
    while session.arrival().is_ok() {
        crew.reap();
        let priority = protocol.arrival_priority(&session);
        let actor = match protocol.roster().admit(role, priority) {
            Ok(actor) => actor,
            Err(e) => {
                debug!(%role, reason = %e, "arrival refused");
                continue;
            }
        };

        let name = format!("{}-{}", role, actor.id());
        let spawned = {
            let protocol = Arc::clone(&protocol);
            let actor = Arc::clone(&actor);
            let session = session.clone();
            let span = span.clone();
            thread::Builder::new().name(name).spawn(move || {
                let _entered = span.enter();
                run_actor(protocol.as_ref(), &actor, &session);
            })
        };
        match spawned {
            Ok(handle) => crew.adopt(handle),
            Err(e) => {
                warn!(actor = %actor.id(), error = %e, "could not spawn actor thread");
                actor.advance(ActorState::Done);
                protocol.roster().retire(actor.id());
            }
        }
    }
    debug!(%role, "spawner exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorState, Roster};
    use crate::primitives::{Primitive, Semaphore};
    use rendezvous_env::{Cancelled, SystemContext};
    use std::sync::atomic::AtomicU64;
    use std::time::Instant;

    /// Residents take a shared semaphore; spawned visitors take it once.
    struct Toy {
        roster: Roster,
        room: Semaphore,
        rounds: Arc<AtomicU64>,
        visitors: bool,
    }

    impl Protocol for Toy {
        fn roster(&self) -> &Roster {
            &self.roster
        }

        fn cast(&self) -> Vec<Cast> {
            let mut cast = vec![Cast::Resident(Role::Producer), Cast::Resident(Role::Producer)];
            if self.visitors {
                cast.push(Cast::Spawner(Role::Customer));
            }
            cast
        }

        fn round(&self, actor: &Actor, session: &Session) -> Result<Flow, Cancelled> {
            actor.advance(ActorState::Waiting);
            let permit = self.room.acquire(session.cancel())?;
            let _held = actor.hold(permit);
            actor.advance(ActorState::Active);
            session.work()?;
            self.rounds.fetch_add(1, Ordering::SeqCst);
            actor.advance(ActorState::Leaving);
            if actor.role() == Role::Customer {
                return Ok(Flow::Retire);
            }
            actor.advance(ActorState::Idle);
            session.rest()?;
            Ok(Flow::Continue)
        }

        fn primitives(&self) -> Vec<&dyn Primitive> {
            vec![&self.room]
        }
    }

    fn toy_runner(visitors: bool, cap: usize) -> (Runner<Toy>, Arc<AtomicU64>) {
        let rounds = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&rounds);
        let runner = Runner::new(
            Problem::BoundedBuffer,
            Discipline::Semaphore,
            SystemContext::shared(),
            Timing::brisk(),
            move || Toy {
                roster: Roster::new(cap),
                room: Semaphore::new("room", 1),
                rounds: Arc::clone(&counter),
                visitors,
            },
        );
        (runner, rounds)
    }

    #[test]
    fn test_start_is_idempotent_and_stop_is_clean() {
        let (mut runner, rounds) = toy_runner(false, 8);
        runner.start().unwrap();
        let first = runner.run_id();
        runner.start().unwrap();
        assert_eq!(runner.run_id(), first);
        assert_eq!(runner.protocol().map(|p| p.roster().live()), Some(2));

        thread::sleep(Duration::from_millis(60));
        let report = runner.stop();
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(report.workers_joined, 2);
        assert!(rounds.load(Ordering::SeqCst) > 0);
        assert!(!runner.is_running());
    }

    #[test]
    fn test_stop_when_stopped_is_idle() {
        let (mut runner, _) = toy_runner(false, 8);
        let report = runner.stop();
        assert_eq!(report.workers_joined, 0);
        assert!(report.run_id.is_none());
    }

    #[test]
    fn test_restart_gets_new_run() {
        let (mut runner, _) = toy_runner(false, 8);
        runner.start().unwrap();
        let first = runner.run_id();
        runner.stop();
        runner.start().unwrap();
        assert_ne!(runner.run_id(), first);
        assert!(runner.stop().is_clean());
    }

    #[test]
    fn test_spawner_respects_live_cap() {
        let (mut runner, _) = toy_runner(true, 4);
        runner.start().unwrap();
        let started = Instant::now();
        while started.elapsed() < Duration::from_millis(150) {
            if let Some(protocol) = runner.protocol() {
                assert!(protocol.roster().spawned() <= 4);
            }
            thread::sleep(Duration::from_millis(2));
        }
        let report = runner.stop();
        assert!(report.is_clean(), "{report:?}");
        assert!(report.workers_joined > 3);
    }

    #[test]
    fn test_stop_is_prompt_with_blocked_workers() {
        let (mut runner, _) = toy_runner(true, 12);
        runner.start().unwrap();
        thread::sleep(Duration::from_millis(40));
        let started = Instant::now();
        let report = runner.stop();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(report.is_clean(), "{report:?}");
    }

    #[test]
    fn test_drop_stops_workers() {
        let (mut runner, rounds) = toy_runner(false, 8);
        runner.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        drop(runner);
        let after = rounds.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(rounds.load(Ordering::SeqCst), after);
    }
}
