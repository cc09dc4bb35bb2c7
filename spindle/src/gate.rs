//! Condition-gated values.
//!
//! Each primitive pairs a mutex-protected value with a condition variable so
//! threads can block until the value satisfies a predicate:
//!
//! - [`Counter`] - an `i64` with increment/decrement and comparison waits
//! - [`Barrier`] - an arbitrary value gated by a predicate fixed at
//!   construction, with a lock-free "already open" fast path
//! - [`NotifyValue`] - an arbitrary value that wakes one or all waiters on
//!   every change
//!
//! Waits always re-check their predicate after re-acquiring the lock, so a
//! spurious wakeup or a notification racing the first check cannot release a
//! waiter early. A value returned from a wait satisfied the predicate at the
//! moment the waiter held the lock.
//!
//! A panic inside a user predicate or update closure poisons the mutex; the
//! gates recover the guard and keep working with whatever value it holds.

pub mod barrier;
pub mod counter;
pub mod notify;

pub use barrier::Barrier;
pub use counter::Counter;
pub use notify::{Notify, NotifyValue};

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::timeout::Timeout;

/// Mutex + condvar pair shared by the gate primitives.
#[derive(Debug, Default)]
pub(crate) struct Gate<T> {
    value: Mutex<T>,
    cond: Condvar,
}

impl<T> Gate<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until `pred` holds and returns the guard it held under.
    pub(crate) fn wait_until<P>(&self, mut pred: P) -> MutexGuard<'_, T>
    where
        P: FnMut(&T) -> bool,
    {
        let guard = self.lock();
        self.cond
            .wait_while(guard, |value| !pred(value))
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Like [`Gate::wait_until`], giving up once `timeout` elapses.
    pub(crate) fn wait_until_for<P>(&self, mut pred: P, timeout: Timeout) -> Option<MutexGuard<'_, T>>
    where
        P: FnMut(&T) -> bool,
    {
        let deadline = timeout.start();
        let mut guard = self.lock();
        loop {
            if pred(&guard) {
                return Some(guard);
            }
            guard = match deadline.remaining() {
                None => self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner),
                Some(left) if left.is_zero() => return None,
                Some(left) => {
                    self.cond
                        .wait_timeout(guard, left)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    pub(crate) fn notify_one(&self) {
        self.cond.notify_one();
    }

    pub(crate) fn notify_all(&self) {
        self.cond.notify_all();
    }
}
