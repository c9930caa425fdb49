//! Cigarette smokers: an agent puts two of three ingredients on the table;
//! only the smoker holding the third may take them.

mod model;
mod protocols;

pub use model::{Ingredient, SmokersModel};

use super::Stage;
use crate::config::Timing;
use crate::error::SyncError;
use crate::problem::{Discipline, Problem};
use crate::runner::boxed;
use crate::strategy::Strategy;
use protocols::{BarrierSmokers, MonitorSmokers, MutexSmokers, SemaphoreSmokers};
use rendezvous_env::SyncContext;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmokerPoint {
    /// The agent put down everything except `missing`
    Placed { missing: Ingredient },
    /// The smoker holding `smoker` took the pair
    Took { smoker: Ingredient },
    Smoking,
    Rendezvous { generation: u64 },
}

pub(crate) fn strategy(
    discipline: Discipline,
    stage: Stage<SmokersModel, SmokerPoint>,
    ctx: Arc<dyn SyncContext>,
    timing: Timing,
) -> Result<Box<dyn Strategy>, SyncError> {
    let problem = Problem::CigaretteSmokers;
    Ok(match discipline {
        Discipline::Mutex => boxed(problem, discipline, ctx, timing, move || MutexSmokers::new(stage.clone())),
        Discipline::Semaphore => boxed(problem, discipline, ctx, timing, move || SemaphoreSmokers::new(stage.clone())),
        Discipline::Monitor => boxed(problem, discipline, ctx, timing, move || MonitorSmokers::new(stage.clone())),
        Discipline::Barrier => boxed(problem, discipline, ctx, timing, move || BarrierSmokers::new(stage.clone())),
        Discipline::Deadlock => return Err(SyncError::Unsupported { problem, discipline }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problems::testkit::{assert_released_at_notices, checked_stage, ctx, observed_stage, run_watching, stage, timing};
    use crate::problems::ResourceModel;
    use std::time::Duration;

    fn exercise(discipline: Discipline) -> Arc<SmokersModel> {
        let stage = stage(SmokersModel::new(8));
        let model = Arc::clone(&stage.model);
        let mut strategy = strategy(discipline, stage, ctx(), timing()).unwrap();
        let report = run_watching(strategy.as_mut(), Duration::from_millis(300), || {
            assert!(model.on_table().len() <= 2);
            assert_eq!(model.roster().live(), 4);
        });

        assert!(report.is_clean(), "{discipline}: {report:?}");
        assert_eq!(report.workers_joined, 4);
        assert_eq!(model.violations(), 0, "{discipline}");
        assert!(model.progress() > 0, "{discipline} never smoked");
        assert!(model.progress() <= model.placements());
        model
    }

    #[test]
    fn test_mutex_smokers() {
        exercise(Discipline::Mutex);
    }

    #[test]
    fn test_semaphore_smokers() {
        exercise(Discipline::Semaphore);
    }

    #[test]
    fn test_monitor_smokers() {
        exercise(Discipline::Monitor);
    }

    #[test]
    fn test_barrier_smokers() {
        exercise(Discipline::Barrier);
    }

    #[test]
    fn test_deadlock_is_unsupported() {
        let stage = stage(SmokersModel::new(8));
        let err = strategy(Discipline::Deadlock, stage, ctx(), timing()).err().unwrap();
        assert!(matches!(err, SyncError::Unsupported { .. }));
    }

    #[test]
    fn test_only_the_missing_ingredient_holder_takes() {
        let (stage, rx) = observed_stage::<_, SmokerPoint>(SmokersModel::new(8));
        let mut strategy = strategy(Discipline::Semaphore, stage, ctx(), timing()).unwrap();
        run_watching(strategy.as_mut(), Duration::from_millis(200), || {});

        let mut pending = None;
        for notice in rx.try_iter() {
            match notice.point {
                SmokerPoint::Placed { missing } => pending = Some(missing),
                SmokerPoint::Took { smoker } => {
                    assert_eq!(pending.take(), Some(smoker));
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_notices_follow_release() {
        for discipline in [Discipline::Mutex, Discipline::Semaphore, Discipline::Monitor, Discipline::Barrier] {
            let (stage, check) = checked_stage::<_, SmokerPoint>(SmokersModel::new(8));
            let mut strategy = strategy(discipline, stage, ctx(), timing()).unwrap();
            assert_released_at_notices(discipline, strategy.as_mut(), &check);
        }
    }
}
