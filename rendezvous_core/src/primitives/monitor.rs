//! Monitor: one lock plus named condition variables.

use super::{guard, wait_slice, Primitive};
use rendezvous_env::{CancelToken, Cancelled};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, TryLockError};

/// Guard proving the caller is inside a monitor. Leaving the monitor is
/// dropping it.
pub struct MonitorGuard<'a, T> {
    inner: MutexGuard<'a, T>,
    #[cfg(test)]
    _entry: super::held_here::Entry,
}

impl<'a, T> MonitorGuard<'a, T> {
    fn new(inner: MutexGuard<'a, T>) -> Self {
        Self {
            inner,
            #[cfg(test)]
            _entry: super::held_here::Entry::new(),
        }
    }
}

impl<T> Deref for MonitorGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for MonitorGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

/// A monitor protecting state of type `T`.
///
/// The monitor lock is held only for short, non-blocking sections; the one
/// blocking operation inside a monitor, [`Condition::wait_while`], releases
/// it while parked. Entering therefore never needs to be cancellable.
pub struct Monitor<T> {
    name: String,
    state: Mutex<T>,
}

impl<T> Monitor<T> {
    pub fn new(name: impl Into<String>, state: T) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(state),
        }
    }

    /// Enters the monitor.
    pub fn enter(&self) -> MonitorGuard<'_, T> {
        MonitorGuard::new(guard(&self.state))
    }
}

impl<T: Send> Primitive for Monitor<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn held(&self) -> usize {
        match self.state.try_lock() {
            Err(TryLockError::WouldBlock) => 1,
            _ => 0,
        }
    }

    fn waiting(&self) -> usize {
        0
    }
}

/// A condition variable bound to a monitor's predicate.
///
/// Signals are counted so observers can tell which conditions a run
/// actually exercised.
pub struct Condition {
    name: String,
    cv: Condvar,
    signals: AtomicU64,
    waiters: AtomicUsize,
}

impl Condition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cv: Condvar::new(),
            signals: AtomicU64::new(0),
            waiters: AtomicUsize::new(0),
        }
    }

    /// Parks while `blocked` holds, re-checking it after every wakeup.
    ///
    /// The monitor lock is released while parked and re-acquired before the
    /// predicate is evaluated. Returns the guard once `blocked` is false, or
    /// `Err(Cancelled)` (dropping the guard) if `cancel` trips first. A
    /// predicate that is already false returns immediately even when
    /// cancelled, so a grant that has been made is never lost.
    pub fn wait_while<'a, T, F>(
        &self,
        mut inside: MonitorGuard<'a, T>,
        cancel: &CancelToken,
        mut blocked: F,
    ) -> Result<MonitorGuard<'a, T>, Cancelled>
    where
        F: FnMut(&mut T) -> bool,
    {
        while blocked(&mut inside) {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            self.waiters.fetch_add(1, Ordering::SeqCst);
            inside.inner = wait_slice(&self.cv, inside.inner);
            self.waiters.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(inside)
    }

    /// Wakes one waiter.
    pub fn signal(&self) {
        self.signals.fetch_add(1, Ordering::Relaxed);
        self.cv.notify_one();
    }

    /// Wakes every waiter.
    pub fn broadcast(&self) {
        self.signals.fetch_add(1, Ordering::Relaxed);
        self.cv.notify_all();
    }

    /// Number of `signal`/`broadcast` calls so far.
    pub fn signals(&self) -> u64 {
        self.signals.load(Ordering::Relaxed)
    }
}

impl Primitive for Condition {
    fn name(&self) -> &str {
        &self.name
    }

    fn held(&self) -> usize {
        0
    }

    fn waiting(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }

    fn signals(&self) -> u64 {
        Condition::signals(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_wait_while_returns_after_signal() {
        let monitor = Arc::new(Monitor::new("m", false));
        let ready = Arc::new(Condition::new("ready"));
        let waiter = {
            let monitor = Arc::clone(&monitor);
            let ready = Arc::clone(&ready);
            thread::spawn(move || {
                let token = CancelToken::new();
                let inside = monitor.enter();
                let inside = ready.wait_while(inside, &token, |flag| !*flag).unwrap();
                *inside
            })
        };

        thread::sleep(Duration::from_millis(10));
        {
            let mut inside = monitor.enter();
            *inside = true;
            ready.signal();
        }
        assert!(waiter.join().unwrap());
        assert_eq!(ready.signals(), 1);
        assert!(ready.is_quiescent());
        assert!(monitor.is_quiescent());
    }

    #[test]
    fn test_wait_while_is_cancellable() {
        let monitor = Arc::new(Monitor::new("m", 0));
        let never = Arc::new(Condition::new("never"));
        let token = CancelToken::new();
        let remote = token.clone();
        let waiter = {
            let monitor = Arc::clone(&monitor);
            let never = Arc::clone(&never);
            thread::spawn(move || {
                let inside = monitor.enter();
                never.wait_while(inside, &token, |_| true).map(|_| ())
            })
        };

        thread::sleep(Duration::from_millis(15));
        assert_eq!(never.waiting(), 1);
        remote.cancel();
        assert_eq!(waiter.join().unwrap(), Err(Cancelled));
        assert!(never.is_quiescent());
        assert!(monitor.is_quiescent());
    }

    #[test]
    fn test_granted_predicate_wins_over_cancellation() {
        let monitor = Monitor::new("m", 1);
        let cond = Condition::new("c");
        let token = CancelToken::new();
        token.cancel();
        let inside = monitor.enter();
        assert!(cond.wait_while(inside, &token, |v| *v == 0).is_ok());
    }
}
