//! A value that wakes its waiters on every change.

use std::fmt;

use super::Gate;
use crate::timeout::Timeout;

/// Which waiters a mutation wakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Notify {
    /// Wake a single waiter.
    ///
    /// Only suitable when every waiter waits for the same condition: the one
    /// woken waiter may not be the one whose predicate now holds.
    One,
    /// Wake every waiter.
    #[default]
    All,
}

/// A shared value that notifies waiters on every `set`/`update`.
pub struct NotifyValue<T> {
    gate: Gate<T>,
    mode: Notify,
}

impl<T> NotifyValue<T> {
    /// Creates a value that wakes all waiters on change.
    pub const fn new(initial: T) -> Self {
        Self::with_mode(initial, Notify::All)
    }

    pub const fn with_mode(initial: T, mode: Notify) -> Self {
        Self {
            gate: Gate::new(initial),
            mode,
        }
    }

    pub fn mode(&self) -> Notify {
        self.mode
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.gate.lock().clone()
    }

    pub fn set(&self, value: T) {
        self.update(|v| *v = value);
    }

    /// Stores `value` and returns the previous one.
    pub fn replace(&self, value: T) -> T {
        self.update(|v| std::mem::replace(v, value))
    }

    /// Mutates the value under the lock, then notifies per [`Notify`] mode.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let out = f(&mut *self.gate.lock());
        match self.mode {
            Notify::One => self.gate.notify_one(),
            Notify::All => self.gate.notify_all(),
        }
        out
    }

    /// Blocks until `pred` holds and returns the value that satisfied it.
    pub fn wait(&self, pred: impl FnMut(&T) -> bool) -> T
    where
        T: Clone,
    {
        self.gate.wait_until(pred).clone()
    }

    /// Like [`NotifyValue::wait`], returning `None` if `timeout` elapses first.
    pub fn wait_for(&self, pred: impl FnMut(&T) -> bool, timeout: impl Into<Timeout>) -> Option<T>
    where
        T: Clone,
    {
        self.gate
            .wait_until_for(pred, timeout.into())
            .map(|v| (*v).clone())
    }
}

impl<T: Default> Default for NotifyValue<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for NotifyValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyValue")
            .field("value", &*self.gate.lock())
            .field("mode", &self.mode)
            .finish()
    }
}
