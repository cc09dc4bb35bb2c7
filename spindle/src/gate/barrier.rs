//! Predicate barrier: a value that is "open" while a fixed predicate holds.
//!
//! The predicate is evaluated at construction and after every mutation, and
//! the result is cached in an atomic flag. [`Barrier::wait`] on an open
//! barrier returns without touching the mutex.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//! use spindle::gate::Barrier;
//!
//! let ready = Arc::new(Barrier::new(Vec::<u32>::new(), |v: &Vec<u32>| v.len() >= 2));
//! assert!(!ready.is_open());
//!
//! let pusher = {
//!     let ready = Arc::clone(&ready);
//!     thread::spawn(move || {
//!         ready.update(|v| v.push(1));
//!         ready.update(|v| v.push(2));
//!     })
//! };
//!
//! ready.wait();
//! assert!(ready.is_open());
//! pusher.join().unwrap();
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use super::Gate;
use crate::timeout::Timeout;

/// A value gated by a predicate chosen at construction.
pub struct Barrier<T, P = fn(&T) -> bool> {
    gate: Gate<T>,
    predicate: P,
    /// Result of the last predicate evaluation, written under the lock.
    open: AtomicBool,
}

impl<T, P> Barrier<T, P>
where
    P: Fn(&T) -> bool,
{
    /// Creates the barrier and evaluates `predicate` on `initial`.
    pub fn new(initial: T, predicate: P) -> Self {
        let open = predicate(&initial);
        Self {
            gate: Gate::new(initial),
            predicate,
            open: AtomicBool::new(open),
        }
    }

    /// Returns the cached result of the last predicate evaluation.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
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

    /// Mutates the value, re-evaluates the predicate and wakes all waiters
    /// if it now holds.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.gate.lock();
        let out = f(&mut *guard);
        let open = (self.predicate)(&*guard);
        self.open.store(open, Ordering::Release);
        drop(guard);

        if open {
            self.gate.notify_all();
        }
        out
    }

    /// Blocks until the predicate holds.
    pub fn wait(&self) {
        if self.is_open() {
            return;
        }
        drop(self.gate.wait_until(|v| (self.predicate)(v)));
    }

    /// Blocks until the predicate holds or `timeout` elapses.
    ///
    /// Returns `true` if the barrier opened in time.
    pub fn wait_for(&self, timeout: impl Into<Timeout>) -> bool {
        if self.is_open() {
            return true;
        }
        self.gate
            .wait_until_for(|v| (self.predicate)(v), timeout.into())
            .is_some()
    }

    /// Blocks until the predicate holds and returns the value that satisfied it.
    ///
    /// Always takes the lock so the returned value is checked against the
    /// predicate.
    pub fn wait_value(&self) -> T
    where
        T: Clone,
    {
        self.gate.wait_until(|v| (self.predicate)(v)).clone()
    }
}

impl<T: fmt::Debug, P> fmt::Debug for Barrier<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Barrier")
            .field("value", &*self.gate.lock())
            .field("open", &self.open.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
