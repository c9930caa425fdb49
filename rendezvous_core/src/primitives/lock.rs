//! Exclusive lock with cancellable, FIFO acquisition.

use super::semaphore::{Permit, Semaphore};
use super::{guard, Primitive};
use rendezvous_env::{CancelToken, Cancelled};
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

/// A mutual exclusion lock protecting a value of type `T`.
///
/// Ownership is decided by a binary FIFO [`Semaphore`]; the inner std mutex
/// is only ever touched by the current owner, so it never blocks. This makes
/// the lock safe to hold across other blocking calls (a reader count guard
/// held while the first reader waits for the shared gate) without making
/// `stop()` unbounded.
pub struct Lock<T> {
    gate: Semaphore,
    data: Mutex<T>,
}

impl<T> Lock<T> {
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self {
            gate: Semaphore::new(name, 1),
            data: Mutex::new(value),
        }
    }

    /// Waits for the lock, giving up if `cancel` trips.
    pub fn lock(&self, cancel: &CancelToken) -> Result<LockGuard<'_, T>, Cancelled> {
        let permit = self.gate.acquire(cancel)?;
        Ok(LockGuard {
            data: guard(&self.data),
            _permit: permit,
        })
    }

    /// Waits for the lock without observing cancellation.
    ///
    /// Only for release paths: the current owner is itself cancellable and
    /// releases within one wait slice of noticing.
    pub fn lock_for_release(&self) -> LockGuard<'_, T> {
        let never = CancelToken::new();
        let permit = loop {
            if let Ok(permit) = self.gate.acquire(&never) {
                break permit;
            }
        };
        LockGuard {
            data: guard(&self.data),
            _permit: permit,
        }
    }

    /// Takes the lock only if it is free and nobody is queued.
    #[cfg(test)]
    pub(crate) fn try_lock(&self) -> Option<LockGuard<'_, T>> {
        let permit = self.gate.try_acquire()?;
        Some(LockGuard {
            data: guard(&self.data),
            _permit: permit,
        })
    }
}

impl<T: Send> Primitive for Lock<T> {
    fn name(&self) -> &str {
        self.gate.name()
    }

    fn held(&self) -> usize {
        self.gate.held()
    }

    fn waiting(&self) -> usize {
        self.gate.waiting()
    }
}

/// An RAII guard for [`Lock`]. The data unlocks before the gate reopens.
pub struct LockGuard<'a, T> {
    data: MutexGuard<'a, T>,
    _permit: Permit<'a>,
}

impl<T> Deref for LockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> DerefMut for LockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_lock_guards_data() {
        let lock = Lock::new("counter", 0u32);
        let token = CancelToken::new();
        {
            let mut g = lock.lock(&token).unwrap();
            *g += 5;
            assert!(lock.try_lock().is_none());
            assert_eq!(lock.held(), 1);
        }
        assert_eq!(*lock.try_lock().unwrap(), 5);
        assert!(lock.is_quiescent());
    }

    #[test]
    fn test_waiting_for_lock_is_cancellable() {
        let lock = Arc::new(Lock::new("l", ()));
        let token = CancelToken::new();
        let held = lock.lock(&token).unwrap();

        let waiter_token = CancelToken::new();
        let remote = waiter_token.clone();
        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.lock(&waiter_token).map(|_| ()))
        };
        thread::sleep(Duration::from_millis(15));
        remote.cancel();
        assert_eq!(waiter.join().unwrap(), Err(Cancelled));

        drop(held);
        assert!(lock.is_quiescent());
    }

    #[test]
    fn test_lock_for_release_waits_for_owner() {
        let lock = Arc::new(Lock::new("l", 0u8));
        let token = CancelToken::new();
        let held = lock.lock(&token).unwrap();

        let releaser = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let mut g = lock.lock_for_release();
                *g = 9;
            })
        };
        thread::sleep(Duration::from_millis(10));
        drop(held);
        releaser.join().unwrap();
        assert_eq!(*lock.try_lock().unwrap(), 9);
    }
}
