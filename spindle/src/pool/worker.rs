//! Worker threads of a [`crate::pool::Pool`].
//!
//! Each worker owns an `Arc` of its [`WorkerControl`] for as long as its
//! thread runs. The pool keeps the other strong reference in its
//! [`WorkerEntry`]; a shrink drops that entry and hands the caller a
//! [`ReleasedWorker`] holding only a `Weak`, so the released thread finishes
//! on its own schedule while the caller can still observe when it is gone.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use super::{PoolConfig, Shared};
use crate::trace::{debug, trace, warn};

/// Per-worker stop flag, shared between the pool and the worker thread.
#[derive(Debug)]
pub(crate) struct WorkerControl {
    index: usize,
    terminated: AtomicBool,
}

impl WorkerControl {
    fn new(index: usize) -> Self {
        Self {
            index,
            terminated: AtomicBool::new(false),
        }
    }

    pub(crate) fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

/// The pool's bookkeeping for one running worker.
#[derive(Debug)]
pub(crate) struct WorkerEntry {
    control: Arc<WorkerControl>,
    handle: JoinHandle<()>,
}

impl WorkerEntry {
    /// Spawns worker `index` as thread `{config.name}-{index}`.
    pub(crate) fn spawn(index: usize, shared: &Arc<Shared>, config: &PoolConfig) -> io::Result<Self> {
        let control = Arc::new(WorkerControl::new(index));

        let mut builder = thread::Builder::new().name(format!("{}-{index}", config.name));
        if let Some(size) = config.stack_size {
            builder = builder.stack_size(size);
        }

        let handle = builder.spawn({
            let control = Arc::clone(&control);
            let shared = Arc::clone(shared);
            move || run(&control, &shared)
        })?;

        Ok(Self { control, handle })
    }

    pub(crate) fn index(&self) -> usize {
        self.control.index
    }

    /// Sets the worker's private stop flag without waiting for it.
    pub(crate) fn signal_terminate(&self) {
        self.control.terminate();
    }

    /// Waits for the worker thread to exit.
    pub(crate) fn join(self) {
        if self.handle.join().is_err() {
            // Task panics are caught inside the task; this is a bug in the loop itself.
            warn!(worker = self.control.index, "worker thread panicked");
        }
    }

    /// Stops tracking the worker: flags it, detaches its thread and keeps
    /// only a weak reference.
    pub(crate) fn release(self) -> ReleasedWorker {
        self.control.terminate();
        let released = ReleasedWorker {
            index: self.control.index,
            control: Arc::downgrade(&self.control),
        };
        // Dropping the JoinHandle detaches the thread.
        drop(self.handle);
        released
    }
}

/// A worker removed from the pool by a shrinking [`crate::pool::Pool::resize`].
///
/// The pool no longer tracks or joins the thread. It may still be running
/// the task it had in flight when it was released; once that finishes it
/// exits without taking another task.
#[derive(Debug)]
pub struct ReleasedWorker {
    index: usize,
    control: Weak<WorkerControl>,
}

impl ReleasedWorker {
    /// Index the worker had in the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns `true` once the released thread has left its loop.
    pub fn is_finished(&self) -> bool {
        self.control.strong_count() == 0
    }
}

fn run(control: &WorkerControl, shared: &Shared) {
    debug!(worker = control.index, "worker started");

    while let Some(task) = shared.next_task(control) {
        trace!(worker = control.index, "running task");
        task.run(control.index);
    }

    debug!(worker = control.index, "worker exiting");
}
