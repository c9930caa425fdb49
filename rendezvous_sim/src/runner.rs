//! Scenario runner - drives one problem under one discipline and audits it.
//!
//! A run selects the scenario on a fresh [`Controller`] backed by a
//! [`SeededContext`], samples the resource model while the workers run,
//! then stops the strategy and checks the teardown report.

use crate::context::SeededContext;
use crate::scenarios::Scenario;
use rendezvous_core::{Controller, EngineConfig, Listener, Notice, Problem, StopReport, SyncError};
use rendezvous_env::EnvError;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest a stop may take, even from a deadlock.
const STOP_BOUND: Duration = Duration::from_secs(1);

/// Counts the instrumentation notices a run emits.
#[derive(Debug, Default)]
pub struct Tally {
    notices: AtomicU64,
}

impl Tally {
    pub fn count(&self) -> u64 {
        self.notices.load(Ordering::Relaxed)
    }
}

impl<P> Listener<P> for Tally {
    fn notify(&self, _notice: &Notice<P>) {
        self.notices.fetch_add(1, Ordering::Relaxed);
    }
}

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: Scenario,

    /// Seed used
    pub seed: u64,

    /// Whether the scenario passed every check
    pub passed: bool,

    /// Wall-clock time of the whole run, teardown included
    pub elapsed_ms: u64,

    /// Completed rounds (items, reads and writes, meals, haircuts, smokes,
    /// consultations)
    pub progress: u64,

    /// Safety violations the model recorded
    pub violations: u64,

    /// Notices delivered to the listener
    pub notices: u64,

    /// Model samples audited while running
    pub samples: u64,

    /// First failed check, if any
    pub failure_reason: Option<String>,

    /// Teardown report, when the strategy was started
    pub report: Option<StopReport>,
}

impl ScenarioResult {
    fn new(scenario: Scenario, seed: u64) -> Self {
        Self {
            scenario,
            seed,
            passed: false,
            elapsed_ms: 0,
            progress: 0,
            violations: 0,
            notices: 0,
            samples: 0,
            failure_reason: None,
            report: None,
        }
    }

    /// Records a failed check. Only the first one is kept.
    fn fail(&mut self, reason: String) {
        warn!(scenario = %self.scenario, "{}", reason);
        if self.failure_reason.is_none() {
            self.failure_reason = Some(reason);
        }
    }
}

/// Runs harness scenarios.
pub struct ScenarioRunner {
    /// Seed for the run's context
    seed: u64,

    /// Engine configuration every run starts from
    config: EngineConfig,

    /// How long workers run before the stop
    duration: Duration,

    /// Nominal time per real time
    time_scale: f64,

    /// Gap between model samples
    sample_every: Duration,
}

impl ScenarioRunner {
    /// Creates a new runner.
    pub fn new(seed: u64, config: EngineConfig) -> Self {
        Self {
            seed,
            config,
            duration: Duration::from_secs(2),
            time_scale: 1.0,
            sample_every: Duration::from_millis(2),
        }
    }

    /// Sets how long each scenario runs, in seconds. Negative or
    /// non-finite values keep the current duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        if let Ok(duration) = Duration::try_from_secs_f64(secs) {
            self.duration = duration;
        }
        self
    }

    /// Runs pauses `scale` times faster than the configured timing.
    pub fn with_time_scale(mut self, scale: f64) -> Result<Self, EnvError> {
        self.time_scale = EnvError::check_time_scale(scale)?;
        Ok(self)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: Scenario) -> ScenarioResult {
        let started = Instant::now();
        let mut result = ScenarioResult::new(scenario, self.seed);

        if let Err(e) = self.drive(scenario, &mut result) {
            result.fail(format!("run aborted: {}", e));
        }

        result.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        result.passed = result.failure_reason.is_none();
        info!(
            scenario = %scenario,
            seed = self.seed,
            passed = result.passed,
            progress = result.progress,
            samples = result.samples,
            "Scenario finished"
        );
        result
    }

    fn drive(&self, scenario: Scenario, result: &mut ScenarioResult) -> Result<(), SyncError> {
        let ctx = Arc::new(SeededContext::new(self.seed).with_time_scale(self.time_scale)?);
        let mut ctl = Controller::new(ctx, self.config.clone())?;

        let tally = Arc::new(Tally::default());
        attach(&mut ctl, scenario.problem, Arc::clone(&tally));

        ctl.select(scenario.problem, scenario.discipline)?;
        debug!(scenario = %scenario, duration = ?self.duration, "Workers started");

        let deadline = Instant::now() + self.duration;
        while Instant::now() < deadline {
            result.samples += 1;
            if let Some(breach) = audit(&ctl, scenario) {
                result.fail(breach);
                break;
            }
            thread::sleep(self.sample_every);
        }

        let stopping = Instant::now();
        let report = ctl.stop(scenario.problem).unwrap_or_else(StopReport::idle);
        let stop_time = stopping.elapsed();

        let model = ctl.model(scenario.problem);
        result.progress = model.progress();
        result.violations = model.violations();
        result.notices = tally.count();

        if report.panicked > 0 {
            result.fail(format!("{} workers panicked", report.panicked));
        }
        for leak in report.leaks() {
            result.fail(format!(
                "{} not at rest after stop (held {}, waiting {})",
                leak.name, leak.held, leak.waiting
            ));
        }
        if stop_time > STOP_BOUND {
            result.fail(format!("stop took {:?}", stop_time));
        }
        if result.violations > 0 {
            result.fail(format!("{} safety violations recorded", result.violations));
        }
        if model.roster().live() > 0 {
            result.fail(format!("{} actors still live after stop", model.roster().live()));
        }
        if scenario.expects_progress() && result.progress == 0 {
            result.fail("no round completed".to_string());
        }
        if !scenario.expects_progress() && result.progress > 0 {
            result.fail(format!("deadlock demonstration completed {} rounds", result.progress));
        }

        result.report = Some(report);
        Ok(())
    }
}

fn attach(ctl: &mut Controller, problem: Problem, tally: Arc<Tally>) {
    match problem {
        Problem::BoundedBuffer => ctl.attach_buffer_listener(tally),
        Problem::ReadersWriters => ctl.attach_readers_writers_listener(tally),
        Problem::DiningPhilosophers => ctl.attach_dining_listener(tally),
        Problem::SleepingBarber => ctl.attach_barber_listener(tally),
        Problem::CigaretteSmokers => ctl.attach_smokers_listener(tally),
        Problem::VirtualAssistants => ctl.attach_assistants_listener(tally),
    }
}

/// Checks the bounds one sample of the running model must satisfy.
///
/// Each check reads a single counter; relations between counters are
/// recorded by the models themselves as violations.
fn audit(ctl: &Controller, scenario: Scenario) -> Option<String> {
    if !scenario.expects_progress() && ctl.model(scenario.problem).progress() > 0 {
        return Some("deadlock demonstration made progress".to_string());
    }

    match scenario.problem {
        Problem::BoundedBuffer => {
            let buffer = ctl.buffer();
            let level = buffer.level();
            (level > buffer.slots()).then(|| format!("buffer level {} exceeds {} slots", level, buffer.slots()))
        }
        Problem::ReadersWriters => {
            let writers = ctl.readers_writers().writers_active();
            (writers > 1).then(|| format!("{} writers inside at once", writers))
        }
        Problem::DiningPhilosophers => {
            let table = ctl.dining();
            let in_use = table.forks_in_use();
            (in_use > table.seats()).then(|| format!("{} forks in use at a table of {}", in_use, table.seats()))
        }
        Problem::SleepingBarber => {
            let shop = ctl.barber();
            let waiting = shop.waiting();
            if waiting > shop.waiting_seats() {
                return Some(format!("{} waiting for {} seats", waiting, shop.waiting_seats()));
            }
            within_cap(ctl, scenario.problem)
        }
        Problem::CigaretteSmokers => {
            let on_table = ctl.smokers().on_table().len();
            (on_table > 2).then(|| format!("{} ingredients on the table", on_table))
        }
        Problem::VirtualAssistants => {
            let desk = ctl.assistants();
            let tokens = desk.tokens();
            if tokens > desk.bucket_capacity() {
                return Some(format!("{} tokens in a bucket of {}", tokens, desk.bucket_capacity()));
            }
            let busy = desk.busy();
            if busy > desk.assistants() {
                return Some(format!("{} busy of {} assistants", busy, desk.assistants()));
            }
            within_cap(ctl, scenario.problem)
        }
    }
}

/// Spawned customers never push the roster past its cap.
fn within_cap(ctl: &Controller, problem: Problem) -> Option<String> {
    let roster = ctl.model(problem).roster();
    let spawned = roster.spawned();
    (spawned > roster.cap()).then(|| format!("{} spawned actors over a cap of {}", spawned, roster.cap()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendezvous_core::{Discipline, Timing};
    use rendezvous_env::RunId;

    fn runner(seed: u64) -> ScenarioRunner {
        let config = EngineConfig {
            timing: Timing::brisk(),
            ..EngineConfig::default()
        };
        ScenarioRunner::new(seed, config)
            .with_duration(0.3)
            .with_time_scale(2.0)
            .unwrap()
    }

    #[test]
    fn test_monitor_dining_passes() {
        let scenario = Scenario {
            problem: Problem::DiningPhilosophers,
            discipline: Discipline::Monitor,
        };
        let result = runner(42).run(scenario);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.progress > 0);
        assert!(result.notices > 0);
        assert!(result.samples > 0);
        assert!(result.report.as_ref().is_some_and(|r| r.is_clean()));
    }

    #[test]
    fn test_monitor_buffer_holds_twenty_slots_for_five_seconds() {
        let config = EngineConfig::default();
        assert_eq!(config.buffer.slots, 20);
        let scenario = Scenario {
            problem: Problem::BoundedBuffer,
            discipline: Discipline::Monitor,
        };
        // Five nominal seconds at ten times speed
        let result = ScenarioRunner::new(11, config)
            .with_duration(0.5)
            .with_time_scale(10.0)
            .unwrap()
            .run(scenario);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.progress > 0);
        assert_eq!(result.violations, 0);
        assert!(result.samples > 10);
    }

    #[test]
    fn test_first_run_id_comes_from_the_seed() {
        let scenario = Scenario {
            problem: Problem::BoundedBuffer,
            discipline: Discipline::Semaphore,
        };
        let result = runner(99).run(scenario);
        assert_eq!(result.report.and_then(|r| r.run_id), Some(RunId::from_seed(99)));
    }

    #[test]
    fn test_deadlock_passes_without_progress() {
        let scenario = Scenario {
            problem: Problem::DiningPhilosophers,
            discipline: Discipline::Deadlock,
        };
        let result = runner(7).run(scenario);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.progress, 0);
    }

    #[test]
    fn test_every_scenario_passes() {
        let runner = runner(1234);
        for scenario in Scenario::all() {
            let result = runner.run(scenario);
            assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
            assert_eq!(result.violations, 0);
        }
    }

    #[test]
    fn test_invalid_config_aborts_the_run() {
        let mut config = EngineConfig::default();
        config.buffer.slots = 0;
        let scenario = Scenario {
            problem: Problem::BoundedBuffer,
            discipline: Discipline::Semaphore,
        };
        let result = ScenarioRunner::new(1, config).with_duration(0.05).run(scenario);

        assert!(!result.passed);
        assert!(result.report.is_none());
        assert!(result.failure_reason.is_some_and(|r| r.starts_with("run aborted")));
    }

    #[test]
    fn test_result_serializes() {
        let scenario = Scenario {
            problem: Problem::CigaretteSmokers,
            discipline: Discipline::Semaphore,
        };
        let result = runner(3).run(scenario);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["scenario"]["problem"], "cigarette_smokers");
        assert_eq!(json["scenario"]["discipline"], "semaphore");
        assert_eq!(json["seed"], 3);
    }

    #[test]
    fn test_rejects_bad_time_scale() {
        assert!(ScenarioRunner::new(1, EngineConfig::default()).with_time_scale(-1.0).is_err());
    }
}
