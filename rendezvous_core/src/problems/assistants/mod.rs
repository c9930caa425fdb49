//! Virtual assistants: K assistants serve requests that each cost one token
//! from a bucket the agent refills. High-priority requests go first.

mod model;
mod protocols;

pub use model::DeskModel;

use super::Stage;
use crate::actor::Priority;
use crate::config::Timing;
use crate::error::SyncError;
use crate::problem::{Discipline, Problem};
use crate::runner::boxed;
use crate::strategy::Strategy;
use protocols::{BarrierAssistants, MonitorAssistants, MutexAssistants, SemaphoreAssistants};
use rendezvous_env::SyncContext;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantPoint {
    Queued { priority: Priority },
    /// `assistant` is `None` only if the admission broke the desk invariants
    Admitted { assistant: Option<usize>, priority: Priority },
    /// The agent added a token; `tokens` is the new bucket level
    Refilled { tokens: usize },
    Finished,
    Rendezvous { generation: u64 },
}

pub(crate) fn strategy(
    discipline: Discipline,
    stage: Stage<DeskModel, AssistantPoint>,
    ctx: Arc<dyn SyncContext>,
    timing: Timing,
) -> Result<Box<dyn Strategy>, SyncError> {
    let problem = Problem::VirtualAssistants;
    Ok(match discipline {
        Discipline::Mutex => boxed(problem, discipline, ctx, timing, move || MutexAssistants::new(stage.clone())),
        Discipline::Semaphore => boxed(problem, discipline, ctx, timing, move || SemaphoreAssistants::new(stage.clone())),
        Discipline::Monitor => boxed(problem, discipline, ctx, timing, move || MonitorAssistants::new(stage.clone())),
        Discipline::Barrier => boxed(problem, discipline, ctx, timing, move || BarrierAssistants::new(stage.clone())),
        Discipline::Deadlock => return Err(SyncError::Unsupported { problem, discipline }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssistantsConfig;
    use crate::problems::testkit::{assert_released_at_notices, checked_stage, ctx, observed_stage, run_watching, stage, timing};
    use crate::problems::ResourceModel;
    use std::time::Duration;

    const CAP: usize = 10;

    fn desk(high_share: f64) -> DeskModel {
        DeskModel::new(
            AssistantsConfig {
                assistants: 3,
                bucket_capacity: 5,
                initial_tokens: 3,
                high_priority_share: high_share,
            },
            CAP,
        )
    }

    fn exercise(discipline: Discipline, high_share: f64) -> Arc<DeskModel> {
        let stage = stage(desk(high_share));
        let model = Arc::clone(&stage.model);
        let mut strategy = strategy(discipline, stage, ctx(), timing()).unwrap();
        let report = run_watching(strategy.as_mut(), Duration::from_millis(300), || {
            assert!(model.tokens() <= model.bucket_capacity());
            assert!(model.busy() <= model.assistants());
            assert!(model.roster().spawned() <= CAP);
        });

        assert!(report.is_clean(), "{discipline}: {report:?}");
        assert_eq!(model.violations(), 0, "{discipline}");
        assert!(model.served() > 0, "{discipline} served nobody");
        assert!(model.served() <= 3 + model.refills());
        assert_eq!(model.busy(), 0);
        assert_eq!(model.high_waiting(), 0);
        model
    }

    #[test]
    fn test_mutex_assistants() {
        exercise(Discipline::Mutex, 0.3);
    }

    #[test]
    fn test_semaphore_assistants() {
        exercise(Discipline::Semaphore, 0.3);
    }

    #[test]
    fn test_monitor_assistants() {
        exercise(Discipline::Monitor, 0.3);
    }

    #[test]
    fn test_barrier_assistants() {
        exercise(Discipline::Barrier, 0.3);
    }

    #[test]
    fn test_all_high_traffic_is_served() {
        let model = exercise(Discipline::Semaphore, 1.0);
        assert_eq!(model.served_normal(), 0);
        assert!(model.served_high() > 0);
    }

    #[test]
    fn test_deadlock_is_unsupported() {
        let err = strategy(Discipline::Deadlock, stage(desk(0.3)), ctx(), timing()).err().unwrap();
        assert!(matches!(err, SyncError::Unsupported { .. }));
    }

    #[test]
    fn test_admissions_report_an_assistant() {
        let (stage, rx) = observed_stage::<_, AssistantPoint>(desk(0.5));
        let mut strategy = strategy(Discipline::Monitor, stage, ctx(), timing()).unwrap();
        run_watching(strategy.as_mut(), Duration::from_millis(150), || {});

        let admitted: Vec<_> = rx
            .try_iter()
            .filter_map(|n| match n.point {
                AssistantPoint::Admitted { assistant, .. } => Some(assistant),
                _ => None,
            })
            .collect();
        assert!(!admitted.is_empty());
        assert!(admitted.iter().all(|assistant| assistant.is_some_and(|a| a < 3)));
    }

    #[test]
    fn test_notices_follow_release() {
        for discipline in [Discipline::Mutex, Discipline::Semaphore, Discipline::Monitor, Discipline::Barrier] {
            let (stage, check) = checked_stage::<_, AssistantPoint>(desk(0.5));
            let mut strategy = strategy(discipline, stage, ctx(), timing()).unwrap();
            assert_released_at_notices(discipline, strategy.as_mut(), &check);
        }
    }
}
