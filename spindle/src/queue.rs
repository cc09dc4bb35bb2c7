//! Bounded lock-free MPMC (Multi-Producer Multi-Consumer) queue.
//!
//! Any number of threads may push and pop concurrently through a shared
//! reference (usually an `Arc<Queue<T>>`). Each pushed value is delivered to
//! exactly one consumer, exactly once.
//!
//! # Blocking vs non-blocking
//!
//! - [`Queue::try_push`] / [`Queue::try_pop`] never wait. A rejected push or
//!   an empty pop is backpressure, not an error.
//! - [`Queue::push`] / [`Queue::pop`] claim a position unconditionally and
//!   busy-spin until the matching counterpart shows up. They never park the
//!   thread, so the caller must guarantee that a consumer (or producer) will
//!   eventually arrive, e.g. by sizing the capacity to the workload. Otherwise
//!   they spin forever.
//!
//! # Ordering
//!
//! Values pushed by one producer are consumed in the order that producer
//! pushed them. There is no global FIFO order across racing producers.
//!
//! # Example
//!
//! ```
//! use spindle::queue::Queue;
//!
//! let queue = Queue::new(2).unwrap();
//! queue.try_push(1).unwrap();
//! queue.try_push(2).unwrap();
//! assert_eq!(queue.try_push(3), Err(3));
//!
//! assert_eq!(queue.try_pop(), Some(1));
//! assert_eq!(queue.pop(), 2);
//! ```

pub(crate) mod ring;

use std::collections::TryReserveError;
use std::fmt;

use crate::trace::debug;

use ring::Ring;

/// Error creating a [`Queue`].
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The requested capacity is zero.
    #[error("queue capacity must be at least 1, got {0}")]
    InvalidCapacity(usize),
    /// The slot arena could not be allocated.
    #[error("cannot allocate {capacity} queue slots: {source}")]
    OutOfMemory {
        capacity: usize,
        #[source]
        source: TryReserveError,
    },
}

/// Fixed-capacity lock-free queue shared by producers and consumers.
pub struct Queue<T> {
    ring: Ring<T>,
}

impl<T> Queue<T> {
    /// Creates a queue holding at most `capacity` values.
    ///
    /// Any positive capacity is accepted; it does not need to be a power of two.
    ///
    /// # Errors
    ///
    /// - [`QueueError::InvalidCapacity`] if `capacity` is zero
    /// - [`QueueError::OutOfMemory`] if the slots cannot be allocated
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity(capacity));
        }

        let ring = Ring::with_capacity(capacity)
            .map_err(|source| QueueError::OutOfMemory { capacity, source })?;

        debug!(capacity, "queue created");
        Ok(Self { ring })
    }

    /// Pushes `value`, spinning until a slot is free.
    #[inline]
    pub fn push(&self, value: T) {
        self.ring.push_with(move || value);
    }

    /// Claims a slot, spinning until it is free, then builds the value in it.
    ///
    /// `make` runs only once the slot belongs to this call. It must not
    /// panic: a panic here aborts the process, because a claimed slot cannot
    /// be given back.
    #[inline]
    pub fn push_with<F: FnOnce() -> T>(&self, make: F) {
        self.ring.push_with(make);
    }

    /// Attempts to push `value` without waiting.
    ///
    /// # Errors
    ///
    /// Returns `Err(value)` if the queue is full.
    #[inline]
    pub fn try_push(&self, value: T) -> Result<(), T> {
        self.ring.try_push(value)
    }

    /// Attempts to claim a slot without waiting and builds the value in it.
    ///
    /// See [`Queue::push_with`] for the no-panic requirement on `make`.
    ///
    /// # Errors
    ///
    /// Returns `Err(make)`, uncalled, if the queue is full.
    #[inline]
    pub fn try_push_with<F: FnOnce() -> T>(&self, make: F) -> Result<(), F> {
        self.ring.try_push_with(make)
    }

    /// Pops a value, spinning until one is published.
    #[inline]
    #[must_use]
    pub fn pop(&self) -> T {
        self.ring.pop()
    }

    /// Attempts to pop a value without waiting.
    ///
    /// Returns `None` if the queue is empty.
    #[inline]
    #[must_use]
    pub fn try_pop(&self) -> Option<T> {
        self.ring.try_pop()
    }

    /// Maximum number of values the queue holds.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Approximate number of values in the queue.
    ///
    /// Only a hint under concurrent use.
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.distance().clamp(0, self.capacity() as isize) as usize
    }

    /// Returns `true` if the queue looked empty at the time of the call.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.distance() <= 0
    }

    /// Returns `true` if the queue looked full at the time of the call.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.ring.distance() >= self.capacity() as isize
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}
