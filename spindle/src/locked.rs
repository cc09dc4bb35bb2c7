//! Mutex-guarded FIFO queue and LIFO stack.
//!
//! Unbounded and simple: every operation takes the lock for a single
//! push/pop. [`LockedQueue`] is the task queue of [`crate::pool::Pool`].
//!
//! A poisoned lock is recovered rather than propagated: a push or pop cannot
//! leave the container in a torn state.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<C>(inner: &Mutex<C>) -> MutexGuard<'_, C> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Unbounded FIFO queue behind a mutex.
#[derive(Debug)]
pub struct LockedQueue<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> LockedQueue<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends `value` at the back.
    pub fn push(&self, value: T) {
        lock(&self.inner).push_back(value);
    }

    /// Removes the value at the front, if any.
    pub fn try_pop(&self) -> Option<T> {
        lock(&self.inner).pop_front()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }

    /// Drops every queued value and returns how many there were.
    ///
    /// The values are dropped after the lock is released.
    pub fn clear(&self) -> usize {
        let drained = std::mem::take(&mut *lock(&self.inner));
        drained.len()
    }
}

impl<T> Default for LockedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Unbounded LIFO stack behind a mutex.
#[derive(Debug)]
pub struct LockedStack<T> {
    inner: Mutex<Vec<T>>,
}

impl<T> LockedStack<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
        }
    }

    /// Pushes `value` on top.
    pub fn push(&self, value: T) {
        lock(&self.inner).push(value);
    }

    /// Removes the top value, if any.
    pub fn try_pop(&self) -> Option<T> {
        lock(&self.inner).pop()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }

    /// Drops every value and returns how many there were.
    pub fn clear(&self) -> usize {
        let drained = std::mem::take(&mut *lock(&self.inner));
        drained.len()
    }
}

impl<T> Default for LockedStack<T> {
    fn default() -> Self {
        Self::new()
    }
}
