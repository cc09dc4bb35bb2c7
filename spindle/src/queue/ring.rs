//! Core lock-free MPMC ring buffer algorithm.
//!
//! A bounded queue using per-slot sequence numbers for synchronization,
//! following Dmitry Vyukov's bounded MPMC design:
//!
//! - Each slot has an atomic sequence number (its stamp)
//! - Producers claim a position `pos` on `head`, wait for the slot to be
//!   writable for `pos`, write, then publish it as readable for `pos`
//! - Consumers claim a position on `tail`, wait for the slot to be readable
//!   for `pos`, move the value out, then release it as writable for
//!   `pos + capacity`
//!
//! # Stamps
//!
//! The writable stamp of `pos` is `2 * pos` and the readable stamp is
//! `2 * pos + 1`. With a one-slot ring the plain `pos` / `pos + 1` encoding
//! cannot tell "readable for `pos`" from "writable for `pos + 1`"; doubling
//! keeps every state distinct for all capacities.
//!
//! Positions are assumed never to wrap `usize` (2^63 operations).
//!
//! # Contract
//!
//! A slot that has been claimed must be published. If the constructor
//! closure passed to [`Ring::push_with`] or [`Ring::try_push_with`] panics
//! after the claim, the slot can never be published and its consumer would
//! spin forever, so the process is aborted instead of unwinding.

use std::cell::UnsafeCell;
use std::collections::TryReserveError;
use std::hint;
use std::mem::{self, MaybeUninit};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crate::trace::error;

/// Number of exponential spin rounds before falling back to `yield_now`.
const SPIN_LIMIT: u32 = 6;

/// Stamp of a slot that may be written by the producer holding `pos`.
#[inline]
pub(crate) const fn write_stamp(pos: usize) -> usize {
    pos.wrapping_mul(2)
}

/// Stamp of a slot holding the value published for `pos`.
#[inline]
pub(crate) const fn read_stamp(pos: usize) -> usize {
    pos.wrapping_mul(2).wrapping_add(1)
}

/// A slot in the ring buffer.
#[repr(C)]
#[repr(align(64))] // Each slot on its own cache line to avoid false sharing between threads
pub(crate) struct Slot<T> {
    /// Sequence stamp.
    /// - Initial: `write_stamp(index)`
    /// - After producer write: `read_stamp(pos)`
    /// - After consumer read: `write_stamp(pos + capacity)`
    seq: AtomicUsize,

    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    const fn new(seq: usize) -> Self {
        Self {
            seq: AtomicUsize::new(seq),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Constructs the value in place and publishes it for `pos`.
    ///
    /// # Safety
    ///
    /// The caller must have claimed `pos` and observed `write_stamp(pos)`.
    #[inline]
    unsafe fn publish<F: FnOnce() -> T>(&self, pos: usize, make: F) {
        let guard = AbortOnUnwind { pos };
        let value = make();
        mem::forget(guard);

        // SAFETY: the claim on `pos` gives this thread exclusive write access
        // until the release store below.
        unsafe {
            (*self.value.get()).write(value);
        }
        self.seq.store(read_stamp(pos), Ordering::Release);
    }

    /// Moves the value out and releases the slot for `pos + capacity`.
    ///
    /// # Safety
    ///
    /// The caller must have claimed `pos` and observed `read_stamp(pos)`.
    #[inline]
    unsafe fn take(&self, pos: usize, capacity: usize) -> T {
        // SAFETY: the acquire load of `read_stamp(pos)` made the producer's
        // write visible, and the claim makes this the only reader.
        let value = unsafe { (*self.value.get()).assume_init_read() };
        self.seq
            .store(write_stamp(pos.wrapping_add(capacity)), Ordering::Release);
        value
    }
}

// SAFETY: Slot is Sync because:
// - seq is AtomicUsize (inherently Sync)
// - value is only touched by the thread whose claimed position matches seq
unsafe impl<T: Send> Sync for Slot<T> {}
unsafe impl<T: Send> Send for Slot<T> {}

/// Aborts the process if a claimed slot is abandoned by a panic.
struct AbortOnUnwind {
    pos: usize,
}

impl Drop for AbortOnUnwind {
    fn drop(&mut self) {
        error!(
            pos = self.pos,
            "element constructor panicked inside a claimed queue slot; aborting"
        );
        std::process::abort();
    }
}

/// Producer-side state: head index for slot reservation.
#[repr(C)]
#[repr(align(64))]
pub(crate) struct ProducerState {
    /// Next position to claim for writing.
    pub(crate) head: AtomicUsize,
}

impl ProducerState {
    const fn new() -> Self {
        Self {
            head: AtomicUsize::new(0),
        }
    }
}

/// Consumer-side state: tail index for slot reservation.
#[repr(C)]
#[repr(align(64))]
pub(crate) struct ConsumerState {
    /// Next position to claim for reading.
    pub(crate) tail: AtomicUsize,
}

impl ConsumerState {
    const fn new() -> Self {
        Self {
            tail: AtomicUsize::new(0),
        }
    }
}

/// Exponential spin with a yield fallback, used by the claiming operations.
struct Spin {
    step: u32,
}

impl Spin {
    const fn new() -> Self {
        Self { step: 0 }
    }

    #[inline]
    fn wait(&mut self) {
        if self.step <= SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                hint::spin_loop();
            }
            self.step += 1;
        } else {
            thread::yield_now();
        }
    }
}

/// Core MPMC ring buffer over a heap-allocated slot arena.
pub(crate) struct Ring<T> {
    pub(crate) producer: ProducerState,
    pub(crate) consumer: ConsumerState,
    buffer: Box<[Slot<T>]>,
}

impl<T> Ring<T> {
    /// Allocates a ring with `capacity` slots, all writable for their own index.
    ///
    /// `capacity` must be non-zero; the public constructor checks it.
    pub(crate) fn with_capacity(capacity: usize) -> Result<Self, TryReserveError> {
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(capacity)?;
        buffer.extend((0..capacity).map(|i| Slot::new(write_stamp(i))));

        Ok(Self {
            producer: ProducerState::new(),
            consumer: ConsumerState::new(),
            buffer: buffer.into_boxed_slice(),
        })
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    fn slot(&self, pos: usize) -> &Slot<T> {
        &self.buffer[pos % self.buffer.len()]
    }

    /// Claims the next write position unconditionally and spins until its
    /// slot is free.
    ///
    /// Never returns if no consumer ever drains the slot.
    pub(crate) fn push_with<F: FnOnce() -> T>(&self, make: F) {
        let pos = self.producer.head.fetch_add(1, Ordering::Relaxed);
        let slot = self.slot(pos);

        let mut spin = Spin::new();
        while slot.seq.load(Ordering::Acquire) != write_stamp(pos) {
            spin.wait();
        }

        // SAFETY: `pos` was claimed by fetch_add and its slot is writable.
        unsafe { slot.publish(pos, make) }
    }

    /// Claims the next write position only if its slot is free.
    ///
    /// # Errors
    ///
    /// Returns `Err(make)` without calling it if the queue is full.
    pub(crate) fn try_push_with<F: FnOnce() -> T>(&self, make: F) -> Result<(), F> {
        match self.try_claim_write() {
            // SAFETY: the position was claimed and its slot is writable.
            Some(pos) => unsafe {
                self.slot(pos).publish(pos, make);
                Ok(())
            },
            None => Err(make),
        }
    }

    /// Pushes `value` only if a slot is free.
    ///
    /// # Errors
    ///
    /// Returns `Err(value)` if the queue is full.
    pub(crate) fn try_push(&self, value: T) -> Result<(), T> {
        match self.try_claim_write() {
            // SAFETY: the position was claimed and its slot is writable.
            Some(pos) => unsafe {
                self.slot(pos).publish(pos, move || value);
                Ok(())
            },
            None => Err(value),
        }
    }

    /// CAS-claims `head` when the slot it points at is writable.
    ///
    /// Returns `None` if the slot still belongs to the previous lap (full).
    fn try_claim_write(&self) -> Option<usize> {
        let mut pos = self.producer.head.load(Ordering::Relaxed);
        loop {
            let seq = self.slot(pos).seq.load(Ordering::Acquire);

            // Signed distance between the slot stamp and the stamp we need.
            let diff = seq.wrapping_sub(write_stamp(pos)) as isize;

            if diff == 0 {
                match self.producer.head.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return Some(pos),
                    // Another producer took `pos`.
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                return None;
            } else {
                // head moved past our snapshot.
                pos = self.producer.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Claims the next read position unconditionally and spins until its
    /// value is published.
    ///
    /// Never returns if no producer ever fills the slot.
    pub(crate) fn pop(&self) -> T {
        let pos = self.consumer.tail.fetch_add(1, Ordering::Relaxed);
        let slot = self.slot(pos);

        let mut spin = Spin::new();
        while slot.seq.load(Ordering::Acquire) != read_stamp(pos) {
            spin.wait();
        }

        // SAFETY: `pos` was claimed by fetch_add and its slot is readable.
        unsafe { slot.take(pos, self.capacity()) }
    }

    /// Claims the next read position only if its value is published.
    pub(crate) fn try_pop(&self) -> Option<T> {
        let mut pos = self.consumer.tail.load(Ordering::Relaxed);
        loop {
            let slot = self.slot(pos);
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(read_stamp(pos)) as isize;

            if diff == 0 {
                match self.consumer.tail.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS claimed `pos` and its slot is readable.
                        return Some(unsafe { slot.take(pos, self.capacity()) });
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                // Nothing published at `pos` yet: empty.
                return None;
            } else {
                pos = self.consumer.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Signed distance `head - tail` from two relaxed loads.
    #[inline]
    pub(crate) fn distance(&self) -> isize {
        let head = self.producer.head.load(Ordering::Relaxed);
        let tail = self.consumer.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail) as isize
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        if !mem::needs_drop::<T>() {
            return;
        }

        // `&mut self`: no claim is in flight, so every position in
        // [tail, head) holds a published value.
        let head = *self.producer.head.get_mut();
        let mut pos = *self.consumer.tail.get_mut();
        let capacity = self.buffer.len();

        while (head.wrapping_sub(pos) as isize) > 0 {
            let slot = &mut self.buffer[pos % capacity];
            if *slot.seq.get_mut() == read_stamp(pos) {
                // SAFETY: the stamp says the value for `pos` was written and
                // never taken.
                unsafe { slot.value.get_mut().assume_init_drop() };
            }
            pos = pos.wrapping_add(1);
        }
    }
}
