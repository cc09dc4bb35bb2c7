//! Integer counter with predicate waits.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//! use spindle::gate::Counter;
//!
//! let pending = Arc::new(Counter::new(3));
//! let workers: Vec<_> = (0..3)
//!     .map(|_| {
//!         let pending = Arc::clone(&pending);
//!         thread::spawn(move || {
//!             pending.dec();
//!         })
//!     })
//!     .collect();
//!
//! assert_eq!(pending.wait_eq(0), 0);
//! for w in workers {
//!     w.join().unwrap();
//! }
//! ```

use std::fmt;

use super::Gate;
use crate::timeout::Timeout;

/// A shared `i64` whose changes wake every waiter.
///
/// Waiters bring their own predicate, so every mutation notifies all of
/// them and each re-checks its own condition.
#[derive(Default)]
pub struct Counter {
    gate: Gate<i64>,
}

impl Counter {
    #[must_use]
    pub const fn new(initial: i64) -> Self {
        Self {
            gate: Gate::new(initial),
        }
    }

    pub fn get(&self) -> i64 {
        *self.gate.lock()
    }

    pub fn set(&self, value: i64) {
        self.update(|v| *v = value);
    }

    /// Adds one and returns the new value.
    pub fn inc(&self) -> i64 {
        self.add(1)
    }

    /// Subtracts one and returns the new value.
    pub fn dec(&self) -> i64 {
        self.add(-1)
    }

    /// Adds `delta` and returns the new value.
    ///
    /// Wraps around at the bounds of `i64`.
    pub fn add(&self, delta: i64) -> i64 {
        self.update(|v| {
            *v = v.wrapping_add(delta);
            *v
        })
    }

    /// Mutates the value under the lock, then wakes all waiters.
    pub fn update<R>(&self, f: impl FnOnce(&mut i64) -> R) -> R {
        let out = f(&mut *self.gate.lock());
        self.gate.notify_all();
        out
    }

    /// Blocks until `pred` holds and returns the value that satisfied it.
    pub fn wait(&self, pred: impl FnMut(&i64) -> bool) -> i64 {
        *self.gate.wait_until(pred)
    }

    /// Like [`Counter::wait`], returning `None` if `timeout` elapses first.
    pub fn wait_for(
        &self,
        pred: impl FnMut(&i64) -> bool,
        timeout: impl Into<Timeout>,
    ) -> Option<i64> {
        self.gate.wait_until_for(pred, timeout.into()).map(|v| *v)
    }

    pub fn wait_eq(&self, target: i64) -> i64 {
        self.wait(|&v| v == target)
    }

    pub fn wait_ne(&self, target: i64) -> i64 {
        self.wait(|&v| v != target)
    }

    pub fn wait_gt(&self, target: i64) -> i64 {
        self.wait(|&v| v > target)
    }

    pub fn wait_ge(&self, target: i64) -> i64 {
        self.wait(|&v| v >= target)
    }

    pub fn wait_lt(&self, target: i64) -> i64 {
        self.wait(|&v| v < target)
    }

    pub fn wait_le(&self, target: i64) -> i64 {
        self.wait(|&v| v <= target)
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter").field("value", &self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_inc_dec_add() {
        let counter = Counter::new(0);
        assert_eq!(counter.inc(), 1);
        assert_eq!(counter.inc(), 2);
        assert_eq!(counter.dec(), 1);
        assert_eq!(counter.add(10), 11);
        assert_eq!(counter.add(-11), 0);

        counter.set(-4);
        assert_eq!(counter.get(), -4);
    }

    #[test]
    fn test_add_wraps_at_bounds() {
        let counter = Counter::new(i64::MAX);
        assert_eq!(counter.inc(), i64::MIN);
        assert_eq!(counter.dec(), i64::MAX);
        assert_eq!(counter.add(i64::MAX), -2);
    }

    #[test]
    fn test_comparison_waits_return_immediately_when_satisfied() {
        let counter = Counter::new(5);
        assert_eq!(counter.wait_eq(5), 5);
        assert_eq!(counter.wait_ne(4), 5);
        assert_eq!(counter.wait_gt(4), 5);
        assert_eq!(counter.wait_ge(5), 5);
        assert_eq!(counter.wait_lt(6), 5);
        assert_eq!(counter.wait_le(5), 5);
    }

    #[test]
    fn test_wait_ge_wakes_after_increments() {
        let counter = Arc::new(Counter::new(0));

        let waiter = {
            let counter = Arc::clone(&counter);
            thread::spawn(move || counter.wait_ge(10))
        };

        for _ in 0..10 {
            counter.inc();
        }

        let seen = waiter.join().unwrap();
        assert!(seen >= 10);
    }

    #[test]
    fn test_many_waiters_with_different_targets() {
        let counter = Arc::new(Counter::new(0));

        let waiters: Vec<_> = (1..=4)
            .map(|target| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || (target, counter.wait_ge(target)))
            })
            .collect();

        for _ in 0..4 {
            thread::sleep(Duration::from_millis(2));
            counter.inc();
        }

        for w in waiters {
            let (target, seen) = w.join().unwrap();
            assert!(seen >= target, "waiter for {target} saw {seen}");
        }
    }

    #[test]
    fn test_wait_for_times_out() {
        let counter = Counter::new(0);
        assert_eq!(counter.wait_for(|&v| v > 0, Duration::from_millis(10)), None);
        assert_eq!(counter.wait_for(|&v| v == 0, Duration::from_millis(10)), Some(0));
    }

    #[test]
    fn test_update_returns_closure_result() {
        let counter = Counter::new(7);
        let doubled = counter.update(|v| {
            *v *= 2;
            *v
        });
        assert_eq!(doubled, 14);
        assert_eq!(counter.get(), 14);
    }
}
