//! Lifecycle controller: selects, swaps and stops strategies at runtime.
//!
//! The controller owns one resource model per problem for its whole life
//! and at most one running strategy per problem. Switching a problem to
//! another discipline always goes through the same sequence:
//!
//! ```text
//!   select(problem, discipline)
//!     ├─ reject unsupported combination (nothing is stopped)
//!     ├─ stop the outgoing strategy, blocking until every worker is joined
//!     ├─ reset the problem's model and roster
//!     └─ build the incoming strategy with the problem's listener, start it
//! ```
//!
//! Listeners are wired into a strategy when it is built, so attaching one
//! affects the next `select` of that problem, not a strategy already running.

use crate::actor::{ActorSnapshot, Position};
use crate::config::EngineConfig;
use crate::error::SyncError;
use crate::instrument::{Listener, Port};
use crate::problem::{Discipline, Problem};
use crate::problems::assistants::{self, AssistantPoint, DeskModel};
use crate::problems::barber::{self, BarberPoint, ShopModel};
use crate::problems::buffer::{self, BufferModel, BufferPoint};
use crate::problems::dining::{self, DiningPoint, TableModel};
use crate::problems::readers_writers::{self, RwModel, RwPoint};
use crate::problems::smokers::{self, SmokerPoint, SmokersModel};
use crate::problems::{ResourceModel, Stage};
use crate::strategy::{StopReport, Strategy};
use rendezvous_env::{ActorId, SyncContext};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{info, warn};

/// Listener slots, one per problem.
#[derive(Default)]
struct Listeners {
    buffer: Option<Arc<dyn Listener<BufferPoint>>>,
    readers_writers: Option<Arc<dyn Listener<RwPoint>>>,
    dining: Option<Arc<dyn Listener<DiningPoint>>>,
    barber: Option<Arc<dyn Listener<BarberPoint>>>,
    smokers: Option<Arc<dyn Listener<SmokerPoint>>>,
    assistants: Option<Arc<dyn Listener<AssistantPoint>>>,
}

/// Owns the resource models and the active strategy of every problem.
pub struct Controller {
    ctx: Arc<dyn SyncContext>,
    config: EngineConfig,
    buffer: Arc<BufferModel>,
    readers_writers: Arc<RwModel>,
    dining: Arc<TableModel>,
    barber: Arc<ShopModel>,
    smokers: Arc<SmokersModel>,
    assistants: Arc<DeskModel>,
    listeners: Listeners,
    active: HashMap<Problem, Box<dyn Strategy>>,
}

impl Controller {
    /// Creates a controller with every problem stopped.
    pub fn new(ctx: Arc<dyn SyncContext>, config: EngineConfig) -> Result<Self, SyncError> {
        config.validate()?;
        let cap = config.live_actor_cap;
        Ok(Self {
            buffer: Arc::new(BufferModel::new(config.buffer.clone(), cap)),
            readers_writers: Arc::new(RwModel::new(config.readers_writers.clone(), cap)),
            dining: Arc::new(TableModel::new(config.dining.clone(), cap)),
            barber: Arc::new(ShopModel::new(config.barber.clone(), cap)),
            smokers: Arc::new(SmokersModel::new(cap)),
            assistants: Arc::new(DeskModel::new(config.assistants.clone(), cap)),
            listeners: Listeners::default(),
            active: HashMap::new(),
            ctx,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs `problem` under `discipline`, replacing whatever strategy the
    /// problem had. Returns the outgoing strategy's stop report, if any.
    ///
    /// An unsupported combination is rejected before anything is stopped.
    pub fn select(&mut self, problem: Problem, discipline: Discipline) -> Result<Option<StopReport>, SyncError> {
        if !problem.supports(discipline) {
            return Err(SyncError::Unsupported { problem, discipline });
        }
        let outgoing = self.stop(problem);
        self.model(problem).reset();

        let mut strategy = self.build(problem, discipline)?;
        strategy.start()?;
        info!(%problem, %discipline, run_id = ?strategy.run_id(), "strategy selected");
        self.active.insert(problem, strategy);
        Ok(outgoing)
    }

    /// Stops the strategy running `problem`, blocking until its workers are
    /// joined. Returns `None` if nothing was running.
    pub fn stop(&mut self, problem: Problem) -> Option<StopReport> {
        let mut strategy = self.active.remove(&problem)?;
        let report = strategy.stop();
        if !report.is_clean() {
            warn!(%problem, discipline = %strategy.discipline(), "outgoing strategy left primitives busy");
        }
        Some(report)
    }

    /// Stops every running strategy.
    pub fn stop_all(&mut self) -> Vec<(Problem, StopReport)> {
        let running: Vec<Problem> = self.active.keys().copied().collect();
        running
            .into_iter()
            .filter_map(|problem| self.stop(problem).map(|report| (problem, report)))
            .collect()
    }

    /// Discipline currently running `problem`.
    pub fn active(&self, problem: Problem) -> Option<Discipline> {
        self.active.get(&problem).map(|s| s.discipline())
    }

    pub fn is_running(&self, problem: Problem) -> bool {
        self.active.get(&problem).is_some_and(|s| s.is_running())
    }

    /// Changes the live-actor cap of every problem. Spawners observe the new
    /// cap on their next arrival; actors already admitted are not evicted.
    pub fn set_live_actor_cap(&mut self, cap: usize) -> Result<(), SyncError> {
        let mut config = self.config.clone();
        config.live_actor_cap = cap;
        config.validate()?;
        self.config = config;
        for problem in Problem::all() {
            self.model(problem).roster().set_cap(cap);
        }
        info!(cap, "live actor cap changed");
        Ok(())
    }

    pub fn attach_buffer_listener(&mut self, listener: Arc<dyn Listener<BufferPoint>>) {
        self.listeners.buffer = Some(listener);
    }

    pub fn attach_readers_writers_listener(&mut self, listener: Arc<dyn Listener<RwPoint>>) {
        self.listeners.readers_writers = Some(listener);
    }

    pub fn attach_dining_listener(&mut self, listener: Arc<dyn Listener<DiningPoint>>) {
        self.listeners.dining = Some(listener);
    }

    pub fn attach_barber_listener(&mut self, listener: Arc<dyn Listener<BarberPoint>>) {
        self.listeners.barber = Some(listener);
    }

    pub fn attach_smokers_listener(&mut self, listener: Arc<dyn Listener<SmokerPoint>>) {
        self.listeners.smokers = Some(listener);
    }

    pub fn attach_assistants_listener(&mut self, listener: Arc<dyn Listener<AssistantPoint>>) {
        self.listeners.assistants = Some(listener);
    }

    /// Removes every listener. Running strategies keep theirs until the
    /// next `select`.
    pub fn detach_listeners(&mut self) {
        self.listeners = Listeners::default();
    }

    pub fn buffer(&self) -> &Arc<BufferModel> {
        &self.buffer
    }

    pub fn readers_writers(&self) -> &Arc<RwModel> {
        &self.readers_writers
    }

    pub fn dining(&self) -> &Arc<TableModel> {
        &self.dining
    }

    pub fn barber(&self) -> &Arc<ShopModel> {
        &self.barber
    }

    pub fn smokers(&self) -> &Arc<SmokersModel> {
        &self.smokers
    }

    pub fn assistants(&self) -> &Arc<DeskModel> {
        &self.assistants
    }

    /// The resource model of `problem`, type-erased.
    pub fn model(&self, problem: Problem) -> &dyn ResourceModel {
        match problem {
            Problem::BoundedBuffer => self.buffer.as_ref(),
            Problem::ReadersWriters => self.readers_writers.as_ref(),
            Problem::DiningPhilosophers => self.dining.as_ref(),
            Problem::SleepingBarber => self.barber.as_ref(),
            Problem::CigaretteSmokers => self.smokers.as_ref(),
            Problem::VirtualAssistants => self.assistants.as_ref(),
        }
    }

    /// Live actors of `problem`.
    pub fn actors(&self, problem: Problem) -> Vec<ActorSnapshot> {
        self.model(problem).roster().snapshot()
    }

    /// Records an advisory display target for a live actor. Returns false if
    /// the actor is gone.
    pub fn suggest_target(&self, problem: Problem, actor: ActorId, target: Option<Position>) -> bool {
        match self.model(problem).roster().get(actor) {
            Some(actor) => {
                actor.set_target(target);
                true
            }
            None => false,
        }
    }

    fn stage<M, P: Debug>(&self, model: &Arc<M>, listener: &Option<Arc<dyn Listener<P>>>) -> Stage<M, P> {
        Stage {
            model: Arc::clone(model),
            port: Port::new(Arc::clone(&self.ctx), listener.clone()),
        }
    }

    fn build(&self, problem: Problem, discipline: Discipline) -> Result<Box<dyn Strategy>, SyncError> {
        let ctx = Arc::clone(&self.ctx);
        let timing = self.config.timing.clone();
        let l = &self.listeners;
        match problem {
            Problem::BoundedBuffer => buffer::strategy(discipline, self.stage(&self.buffer, &l.buffer), ctx, timing),
            Problem::ReadersWriters => readers_writers::strategy(
                discipline,
                self.stage(&self.readers_writers, &l.readers_writers),
                ctx,
                timing,
            ),
            Problem::DiningPhilosophers => dining::strategy(discipline, self.stage(&self.dining, &l.dining), ctx, timing),
            Problem::SleepingBarber => barber::strategy(discipline, self.stage(&self.barber, &l.barber), ctx, timing),
            Problem::CigaretteSmokers => smokers::strategy(discipline, self.stage(&self.smokers, &l.smokers), ctx, timing),
            Problem::VirtualAssistants => {
                assistants::strategy(discipline, self.stage(&self.assistants, &l.assistants), ctx, timing)
            }
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timing;
    use crate::instrument::channel;
    use crate::problems::buffer::BufferPoint;
    use rendezvous_env::SystemContext;
    use std::thread;
    use std::time::Duration;

    fn controller() -> Controller {
        let config = EngineConfig {
            timing: Timing::brisk(),
            ..EngineConfig::default()
        };
        Controller::new(SystemContext::shared(), config).unwrap()
    }

    #[test]
    fn test_select_and_switch() {
        let mut ctl = controller();
        assert!(ctl.select(Problem::BoundedBuffer, Discipline::Semaphore).unwrap().is_none());
        assert_eq!(ctl.active(Problem::BoundedBuffer), Some(Discipline::Semaphore));
        thread::sleep(Duration::from_millis(50));

        let outgoing = ctl
            .select(Problem::BoundedBuffer, Discipline::Monitor)
            .unwrap()
            .expect("semaphore strategy was running");
        assert!(outgoing.is_clean(), "{outgoing:?}");
        assert_eq!(ctl.active(Problem::BoundedBuffer), Some(Discipline::Monitor));
        assert!(ctl.is_running(Problem::BoundedBuffer));

        let report = ctl.stop(Problem::BoundedBuffer).unwrap();
        assert!(report.is_clean());
        assert_eq!(ctl.buffer().violations(), 0);
        assert!(ctl.stop(Problem::BoundedBuffer).is_none());
    }

    #[test]
    fn test_unsupported_keeps_running_strategy() {
        let mut ctl = controller();
        ctl.select(Problem::SleepingBarber, Discipline::Mutex).unwrap();
        let err = ctl.select(Problem::SleepingBarber, Discipline::Deadlock).unwrap_err();
        assert!(matches!(err, SyncError::Unsupported { .. }));
        assert_eq!(ctl.active(Problem::SleepingBarber), Some(Discipline::Mutex));
    }

    #[test]
    fn test_switch_resets_the_model() {
        let mut ctl = controller();
        ctl.select(Problem::DiningPhilosophers, Discipline::Monitor).unwrap();
        thread::sleep(Duration::from_millis(80));
        assert!(ctl.dining().total_meals() > 0);

        // The deadlock demo never eats, so any meal left would be stale
        ctl.select(Problem::DiningPhilosophers, Discipline::Deadlock).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ctl.dining().total_meals(), 0);
        ctl.stop_all();
        assert!(!ctl.is_running(Problem::DiningPhilosophers));
    }

    #[test]
    fn test_problems_run_side_by_side() {
        let mut ctl = controller();
        for problem in Problem::all() {
            ctl.select(problem, Discipline::Monitor).unwrap();
        }
        thread::sleep(Duration::from_millis(100));
        let reports = ctl.stop_all();
        assert_eq!(reports.len(), Problem::all().len());
        for (problem, report) in reports {
            assert!(report.is_clean(), "{problem}: {report:?}");
            assert_eq!(ctl.model(problem).violations(), 0, "{problem}");
        }
    }

    #[test]
    fn test_listener_takes_effect_on_next_select() {
        let mut ctl = controller();
        let (listener, rx) = channel::<BufferPoint>();
        ctl.select(Problem::BoundedBuffer, Discipline::Mutex).unwrap();
        ctl.attach_buffer_listener(listener);
        thread::sleep(Duration::from_millis(30));
        assert!(rx.try_recv().is_err());

        ctl.select(Problem::BoundedBuffer, Discipline::Mutex).unwrap();
        thread::sleep(Duration::from_millis(50));
        ctl.stop_all();
        assert!(rx.try_iter().count() > 0);
    }

    #[test]
    fn test_live_actor_cap_is_validated() {
        let mut ctl = controller();
        assert!(ctl.set_live_actor_cap(2).is_err());
        ctl.set_live_actor_cap(6).unwrap();
        assert_eq!(ctl.barber().roster().cap(), 6);
        assert_eq!(ctl.config().live_actor_cap, 6);
    }

    #[test]
    fn test_suggest_target_reaches_live_actor() {
        let mut ctl = controller();
        ctl.select(Problem::DiningPhilosophers, Discipline::Semaphore).unwrap();
        let first = ctl.actors(Problem::DiningPhilosophers)[0].id;
        let target = Position { x: 1.0, y: 2.0 };
        assert!(ctl.suggest_target(Problem::DiningPhilosophers, first, Some(target)));
        assert_eq!(ctl.dining().roster().get(first).and_then(|a| a.target()), Some(target));
        assert!(!ctl.suggest_target(Problem::DiningPhilosophers, ActorId(u64::MAX), None));
    }
}
