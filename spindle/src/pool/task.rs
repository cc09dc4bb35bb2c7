//! Type-erased pool tasks and their one-shot result handles.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};

use crate::timeout::Timeout;
use crate::trace::warn;

/// Why a task produced no value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The task body panicked; the worker survived.
    #[error("task panicked on worker {worker}: {message}")]
    Panicked { worker: usize, message: String },
    /// The task was discarded before it ran.
    #[error("task was discarded before it ran")]
    Cancelled,
}

/// A queued unit of work, invoked with the index of the worker running it.
pub(crate) struct Task {
    run: Box<dyn FnOnce(usize) + Send + 'static>,
}

impl Task {
    pub(crate) fn run(self, worker: usize) {
        (self.run)(worker);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}

/// Wraps `f` so its result or panic lands in the returned handle.
pub(crate) fn package<F, R>(f: F) -> (Task, TaskHandle<R>)
where
    F: FnOnce(usize) -> R + Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);

    let run = Box::new(move |worker: usize| {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(worker))).map_err(|payload| {
            let message = panic_message(payload.as_ref());
            warn!(worker, message = %message, "task panicked");
            TaskError::Panicked { worker, message }
        });
        // The caller may have dropped its handle.
        let _ = tx.send(outcome);
    });

    (Task { run }, TaskHandle { rx })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Receives the outcome of a task pushed onto a [`crate::pool::Pool`].
///
/// The outcome is delivered once: after a `try_wait` or `wait_timeout`
/// returned `Some`, later calls report [`TaskError::Cancelled`]. Dropping the
/// handle does not cancel the task.
pub struct TaskHandle<R> {
    rx: Receiver<Result<R, TaskError>>,
}

impl<R> TaskHandle<R> {
    /// Blocks until the task finished or was discarded.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Panicked`] if the task body panicked
    /// - [`TaskError::Cancelled`] if the task was dropped without running
    pub fn wait(self) -> Result<R, TaskError> {
        self.rx.recv().unwrap_or(Err(TaskError::Cancelled))
    }

    /// Blocks for at most `timeout`.
    ///
    /// Returns `None` if the task is still queued or running.
    pub fn wait_timeout(&self, timeout: impl Into<Timeout>) -> Option<Result<R, TaskError>> {
        match timeout.into() {
            Timeout::Infinite => Some(self.rx.recv().unwrap_or(Err(TaskError::Cancelled))),
            Timeout::Duration(d) => match self.rx.recv_timeout(d) {
                Ok(outcome) => Some(outcome),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => Some(Err(TaskError::Cancelled)),
            },
        }
    }

    /// Returns the outcome if it is already available.
    pub fn try_wait(&self) -> Option<Result<R, TaskError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(TaskError::Cancelled)),
        }
    }
}

impl<R> fmt::Debug for TaskHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").finish_non_exhaustive()
    }
}
