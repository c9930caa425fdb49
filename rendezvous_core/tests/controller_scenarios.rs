//! End-to-end runs through the lifecycle controller.

use rendezvous_core::{
    ActorState, Controller, Discipline, EngineConfig, Problem, ResourceModel, SyncError, Timing,
};
use rendezvous_env::SystemContext;
use std::thread;
use std::time::{Duration, Instant};

fn controller() -> Controller {
    let config = EngineConfig {
        timing: Timing::brisk(),
        ..EngineConfig::default()
    };
    Controller::new(SystemContext::shared(), config).unwrap()
}

#[test]
fn test_monitor_buffer_scenario() {
    let mut ctl = controller();
    assert_eq!(ctl.buffer().slots(), 20);
    assert_eq!(ctl.buffer().initial_level(), 10);

    ctl.select(Problem::BoundedBuffer, Discipline::Monitor).unwrap();
    let started = Instant::now();
    while started.elapsed() < Duration::from_millis(300) {
        assert!(ctl.buffer().level() <= 20);
        thread::sleep(Duration::from_millis(1));
    }
    let report = ctl.stop(Problem::BoundedBuffer).unwrap();

    assert!(report.is_clean(), "{report:?}");
    for condition in ["not_full", "not_empty"] {
        let status = report
            .primitives
            .iter()
            .find(|p| p.name == condition)
            .unwrap_or_else(|| panic!("{condition} missing from {report:?}"));
        assert!(status.signals > 0, "{condition} was never signaled");
    }

    let buffer = ctl.buffer();
    assert_eq!(buffer.violations(), 0);
    assert!(buffer.high_watermark() <= 20);
    assert!(buffer.is_balanced());
    assert!(buffer.produced() > 0 && buffer.consumed() > 0);
}

#[test]
fn test_every_combination_tears_down_cleanly() {
    let mut ctl = controller();
    for problem in Problem::all() {
        for discipline in problem.disciplines() {
            ctl.select(problem, discipline).unwrap();
            thread::sleep(Duration::from_millis(60));

            let stopping = Instant::now();
            let report = ctl.stop(problem).unwrap();
            assert!(stopping.elapsed() < Duration::from_secs(1), "{problem}/{discipline} slow to stop");
            assert!(report.is_clean(), "{problem}/{discipline}: {report:?}");
            assert_eq!(report.panicked, 0);
            assert_eq!(ctl.model(problem).violations(), 0, "{problem}/{discipline}");
            assert_eq!(ctl.model(problem).roster().live(), 0);
        }
    }
}

#[test]
fn test_unsupported_combinations_are_rejected() {
    let mut ctl = controller();
    for problem in Problem::all() {
        if problem == Problem::DiningPhilosophers {
            continue;
        }
        match ctl.select(problem, Discipline::Deadlock) {
            Err(SyncError::Unsupported { problem: p, discipline }) => {
                assert_eq!(p, problem);
                assert_eq!(discipline, Discipline::Deadlock);
            }
            other => panic!("{problem}: expected Unsupported, got {:?}", other.map(|_| ())),
        }
        assert!(!ctl.is_running(problem));
    }
}

#[test]
fn test_deadlock_demo_blocks_until_stopped() {
    let mut ctl = controller();
    ctl.select(Problem::DiningPhilosophers, Discipline::Deadlock).unwrap();

    let seats = ctl.dining().seats();
    let deadline = Instant::now() + Duration::from_secs(2);
    while ctl.dining().forks_in_use() < seats {
        assert!(Instant::now() < deadline, "philosophers never took their left forks");
        thread::sleep(Duration::from_millis(2));
    }

    for _ in 0..20 {
        assert_eq!(ctl.dining().total_meals(), 0);
        let actors = ctl.actors(Problem::DiningPhilosophers);
        assert_eq!(actors.len(), seats);
        assert!(actors.iter().all(|a| a.state == ActorState::Waiting));
        thread::sleep(Duration::from_millis(5));
    }
    assert!(ctl.is_running(Problem::DiningPhilosophers));

    let stopping = Instant::now();
    let report = ctl.stop(Problem::DiningPhilosophers).unwrap();
    assert!(stopping.elapsed() < Duration::from_secs(1));
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.workers_joined, seats);
    assert_eq!(ctl.dining().forks_in_use(), 0);
}

#[test]
fn test_hoare_monitor_fixes_the_deadlock() {
    let mut ctl = controller();
    ctl.select(Problem::DiningPhilosophers, Discipline::Deadlock).unwrap();
    thread::sleep(Duration::from_millis(50));
    let outgoing = ctl.select(Problem::DiningPhilosophers, Discipline::Monitor).unwrap();
    assert!(outgoing.is_some_and(|r| r.is_clean()));

    thread::sleep(Duration::from_millis(150));
    assert!(ctl.dining().total_meals() > 0);
    assert_eq!(ctl.dining().violations(), 0);
}
