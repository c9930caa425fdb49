//! Helpers for driving protocols in unit tests.

use super::Stage;
use crate::config::Timing;
use crate::instrument::{channel, Listener, Notice, Port};
use crate::primitives::held_here;
use crate::strategy::{StopReport, Strategy};
use crossbeam::channel::Receiver;
use rendezvous_env::{SyncContext, SystemContext};
use std::fmt::{Debug, Display};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub(crate) fn ctx() -> Arc<dyn SyncContext> {
    SystemContext::shared()
}

pub(crate) fn timing() -> Timing {
    Timing::brisk()
}

/// A stage with nobody listening.
pub(crate) fn stage<M, P: Debug>(model: M) -> Stage<M, P> {
    Stage {
        model: Arc::new(model),
        port: Port::detached(ctx()),
    }
}

/// A stage whose notices land in the returned receiver.
pub(crate) fn observed_stage<M, P>(model: M) -> (Stage<M, P>, Receiver<Notice<P>>)
where
    P: Debug + Clone + Send + 'static,
{
    let (listener, rx) = channel::<P>();
    let stage = Stage {
        model: Arc::new(model),
        port: Port::new(ctx(), Some(listener as Arc<dyn Listener<P>>)),
    };
    (stage, rx)
}

/// Runs `strategy` for `duration`, calling `check` about every millisecond,
/// then stops it.
pub(crate) fn run_watching(
    strategy: &mut dyn Strategy,
    duration: Duration,
    mut check: impl FnMut(),
) -> StopReport {
    strategy.start().expect("strategy starts");
    let started = Instant::now();
    while started.elapsed() < duration {
        check();
        thread::sleep(Duration::from_millis(1));
    }
    let stopping = Instant::now();
    let report = strategy.stop();
    assert!(stopping.elapsed() < Duration::from_secs(2), "stop took too long");
    report
}

/// Records every point emitted while the worker still held a lock, permit
/// or monitor beyond the ones its actor exposes as held.
pub(crate) struct ReleaseCheck<P> {
    seen: AtomicU64,
    held_over: Mutex<Vec<P>>,
}

impl<P> ReleaseCheck<P> {
    pub(crate) fn seen(&self) -> u64 {
        self.seen.load(Ordering::SeqCst)
    }

    pub(crate) fn held_over(&self) -> Vec<P>
    where
        P: Clone,
    {
        self.held_over.lock().unwrap().clone()
    }
}

impl<P: Clone + Send> Listener<P> for ReleaseCheck<P> {
    fn notify(&self, notice: &Notice<P>) {
        self.seen.fetch_add(1, Ordering::SeqCst);
        if held_here::count() > notice.held_permits {
            self.held_over.lock().unwrap().push(notice.point.clone());
        }
    }
}

/// A stage whose notices are checked by a [`ReleaseCheck`].
pub(crate) fn checked_stage<M, P>(model: M) -> (Stage<M, P>, Arc<ReleaseCheck<P>>)
where
    P: Debug + Clone + Send + 'static,
{
    let check = Arc::new(ReleaseCheck {
        seen: AtomicU64::new(0),
        held_over: Mutex::new(Vec::new()),
    });
    let stage = Stage {
        model: Arc::new(model),
        port: Port::new(ctx(), Some(Arc::clone(&check) as Arc<dyn Listener<P>>)),
    };
    (stage, check)
}

/// Runs `strategy` briefly and asserts every notice was emitted with only
/// the actor's own holdings still taken.
pub(crate) fn assert_released_at_notices<P>(label: impl Display, strategy: &mut dyn Strategy, check: &ReleaseCheck<P>)
where
    P: Debug + Clone,
{
    let report = run_watching(strategy, Duration::from_millis(150), || {});
    assert!(report.is_clean(), "{label}: {report:?}");
    assert!(check.seen() > 0, "{label}: no notices");
    let held_over = check.held_over();
    assert!(held_over.is_empty(), "{label}: emitted while holding: {held_over:?}");
}
