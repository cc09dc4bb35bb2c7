//! Dynamic pool of worker threads fed from a shared task queue.
//!
//! Tasks are closures taking the index of the worker that runs them. Each
//! [`Pool::push`] returns a [`TaskHandle`] that receives the closure's result,
//! or the panic it raised, or a cancellation if the task was discarded.
//!
//! # Lifecycle
//!
//! ```text
//!  Running ──join()──▶ Draining ──▶ Stopped
//!     │                   │
//!     └──terminate()──────┴──────▶ Terminated
//! ```
//!
//! - [`Pool::join`] lets the workers drain every queued task, then joins them.
//! - [`Pool::terminate`] lets each worker finish only the task it is running,
//!   joins them and discards whatever is still queued.
//! - [`Pool::resize`] grows the pool by spawning workers, or shrinks it by
//!   releasing the excess ones. Released workers are detached, not joined.
//!
//! # Example
//!
//! ```
//! use spindle::pool::Pool;
//!
//! let pool = Pool::new(2).unwrap();
//! let handle = pool.push(|_worker| 6 * 7).unwrap();
//! assert_eq!(handle.wait(), Ok(42));
//! pool.join();
//! ```

mod task;
mod worker;

pub use task::{TaskError, TaskHandle};
pub use worker::ReleasedWorker;

use std::fmt;
use std::io;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::locked::LockedQueue;
use crate::trace::{debug, info};

use task::Task;
use worker::{WorkerControl, WorkerEntry};

/// Configuration for a [`Pool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of workers spawned at construction.
    pub threads: usize,
    /// Thread name prefix; workers are named `{name}-{index}`.
    pub name: String,
    /// Stack size for worker threads. `None` uses the platform default.
    pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get(),
            name: "spindle-worker".to_string(),
            stack_size: None,
        }
    }
}

/// Lifecycle state of a [`Pool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PoolState {
    /// Accepting tasks.
    Running = 0,
    /// `join` in progress; queued tasks are still being run.
    Draining = 1,
    /// Joined after draining the queue.
    Stopped = 2,
    /// Terminated; queued tasks were discarded.
    Terminated = 3,
}

impl PoolState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::Draining,
            2 => Self::Stopped,
            _ => Self::Terminated,
        }
    }

    /// Returns `true` once every worker has been joined.
    pub fn is_stopped(self) -> bool {
        matches!(self, Self::Stopped | Self::Terminated)
    }
}

/// Errors returned by pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
    #[error("pool is shutting down")]
    Closed,
}

/// State shared by the pool handle and every worker thread.
pub(crate) struct Shared {
    tasks: LockedQueue<Task>,
    /// Guards parking only; the queue has its own lock.
    signal: Mutex<()>,
    wake: Condvar,
    idle: AtomicUsize,
    done: AtomicBool,
    terminated: AtomicBool,
    state: AtomicU8,
}

impl Shared {
    fn new() -> Self {
        Self {
            tasks: LockedQueue::new(),
            signal: Mutex::new(()),
            wake: Condvar::new(),
            idle: AtomicUsize::new(0),
            done: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            state: AtomicU8::new(PoolState::Running as u8),
        }
    }

    fn state(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: PoolState, to: PoolState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn lock_signal(&self) -> MutexGuard<'_, ()> {
        self.signal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Notifying under the signal lock pairs with the predicate check in
    // `next_task`, so a parking worker cannot miss the wake-up.
    fn wake_one(&self) {
        let _guard = self.lock_signal();
        self.wake.notify_one();
    }

    fn wake_all(&self) {
        let _guard = self.lock_signal();
        self.wake.notify_all();
    }

    fn should_exit(&self, control: &WorkerControl) -> bool {
        control.is_terminated() || self.terminated.load(Ordering::Acquire)
    }

    /// Blocks until the worker has a task to run or must exit (`None`).
    pub(crate) fn next_task(&self, control: &WorkerControl) -> Option<Task> {
        if self.should_exit(control) {
            return None;
        }
        if let Some(task) = self.tasks.try_pop() {
            return Some(task);
        }

        let guard = self.lock_signal();
        self.idle.fetch_add(1, Ordering::Relaxed);

        let mut task = None;
        let guard = self
            .wake
            .wait_while(guard, |_| {
                if self.should_exit(control) {
                    return false;
                }
                task = self.tasks.try_pop();
                task.is_none() && !self.done.load(Ordering::Acquire)
            })
            .unwrap_or_else(PoisonError::into_inner);

        self.idle.fetch_sub(1, Ordering::Relaxed);
        drop(guard);
        task
    }
}

/// A resizable pool of named worker threads.
///
/// Dropping a pool that is still running joins it, so queued tasks complete
/// first.
pub struct Pool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<WorkerEntry>>,
    /// Held by `join`/`terminate` until the workers they took have exited.
    shutdown: Mutex<()>,
    config: PoolConfig,
}

impl Pool {
    /// Creates a pool with `threads` workers and default naming.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if a worker thread cannot be started.
    pub fn new(threads: usize) -> Result<Self, PoolError> {
        Self::with_config(PoolConfig {
            threads,
            ..PoolConfig::default()
        })
    }

    /// Creates a pool from an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if a worker thread cannot be started. The
    /// workers spawned before the failure are joined.
    pub fn with_config(config: PoolConfig) -> Result<Self, PoolError> {
        info!(threads = config.threads, name = %config.name, "starting pool");

        let pool = Self {
            shared: Arc::new(Shared::new()),
            workers: Mutex::new(Vec::with_capacity(config.threads)),
            shutdown: Mutex::new(()),
            config,
        };
        pool.resize(pool.config.threads)?;
        Ok(pool)
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<WorkerEntry>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_shutdown(&self) -> MutexGuard<'_, ()> {
        self.shutdown.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Grows or shrinks the pool to `threads` workers.
    ///
    /// Growing spawns the missing workers and returns an empty list.
    /// Shrinking removes the workers with the highest indices: each finishes
    /// the task it is running, if any, then exits without taking another. The
    /// pool stops tracking them immediately and returns one
    /// [`ReleasedWorker`] per removed thread.
    ///
    /// # Errors
    ///
    /// - [`PoolError::Closed`] once [`Pool::join`] or [`Pool::terminate`] began
    /// - [`PoolError::Spawn`] if a new worker cannot be started; the workers
    ///   spawned before the failure stay in the pool
    pub fn resize(&self, threads: usize) -> Result<Vec<ReleasedWorker>, PoolError> {
        let mut workers = self.lock_workers();
        if self.shared.state() != PoolState::Running {
            return Err(PoolError::Closed);
        }

        let current = workers.len();
        if threads >= current {
            for index in current..threads {
                workers.push(WorkerEntry::spawn(index, &self.shared, &self.config)?);
            }
            if threads > current {
                debug!(from = current, to = threads, "pool grown");
            }
            return Ok(Vec::new());
        }

        let released: Vec<_> = workers.drain(threads..).map(WorkerEntry::release).collect();
        drop(workers);

        // Parked workers re-check their flags.
        self.shared.wake_all();
        debug!(from = current, to = threads, "pool shrunk, released workers detached");
        Ok(released)
    }

    /// Queues `f` to run on a worker and wakes one idle worker.
    ///
    /// `f` receives the index of the worker running it.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] once [`Pool::join`] or
    /// [`Pool::terminate`] began.
    pub fn push<F, R>(&self, f: F) -> Result<TaskHandle<R>, PoolError>
    where
        F: FnOnce(usize) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.shared.state() != PoolState::Running {
            return Err(PoolError::Closed);
        }

        let (task, handle) = task::package(f);
        self.shared.tasks.push(task);

        if self.shared.state().is_stopped() {
            // Lost a race with shutdown: no worker is left to take it.
            self.shared.tasks.clear();
        } else {
            self.shared.wake_one();
        }
        Ok(handle)
    }

    /// Runs every queued task, then joins all workers.
    ///
    /// New tasks are rejected from the moment this is called. Blocks until
    /// every worker has exited, also when another thread is already joining
    /// or terminating the pool. After [`Pool::terminate`] the queue is left to
    /// it and the state stays [`PoolState::Terminated`].
    pub fn join(&self) {
        self.shared.transition(PoolState::Running, PoolState::Draining);
        self.shared.done.store(true, Ordering::Release);
        self.shared.wake_all();

        let _shutdown = self.lock_shutdown();
        let workers = mem::take(&mut *self.lock_workers());
        if !workers.is_empty() {
            info!(workers = workers.len(), "joining pool");
        }
        for worker in workers {
            worker.join();
        }

        // Stopped goes first: a push that enqueues after this sees it and
        // discards its own task, one that enqueued before is cleared below.
        if !self.shared.transition(PoolState::Draining, PoolState::Stopped) {
            return;
        }
        let discarded = self.shared.tasks.clear();
        if discarded > 0 {
            debug!(discarded, "discarded tasks pushed during shutdown");
        }
    }

    /// Stops every worker after its in-flight task and discards the queue.
    ///
    /// Returns the number of queued tasks that were discarded; their handles
    /// report [`TaskError::Cancelled`]. Blocks until every worker has exited,
    /// including workers a concurrent [`Pool::join`] is waiting on.
    pub fn terminate(&self) -> usize {
        self.shared
            .state
            .store(PoolState::Terminated as u8, Ordering::Release);
        self.shared.terminated.store(true, Ordering::Release);
        self.shared.wake_all();

        let _shutdown = self.lock_shutdown();
        let workers = mem::take(&mut *self.lock_workers());
        for worker in &workers {
            worker.signal_terminate();
        }
        self.shared.wake_all();

        if !workers.is_empty() {
            info!(workers = workers.len(), "terminating pool");
        }
        for worker in workers {
            worker.join();
        }

        let discarded = self.shared.tasks.clear();
        info!(discarded, "pool terminated");
        discarded
    }

    /// Discards every queued task and returns how many there were.
    ///
    /// Running tasks are not affected.
    pub fn clear_queue(&self) -> usize {
        let cleared = self.shared.tasks.clear();
        debug!(cleared, "task queue cleared");
        cleared
    }

    /// Number of workers currently parked waiting for a task.
    pub fn idle_count(&self) -> usize {
        self.shared.idle.load(Ordering::Relaxed)
    }

    /// Number of workers tracked by the pool.
    pub fn size(&self) -> usize {
        self.lock_workers().len()
    }

    /// Number of tasks waiting in the queue.
    pub fn pending(&self) -> usize {
        self.shared.tasks.len()
    }

    pub fn state(&self) -> PoolState {
        self.shared.state()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        if self.shared.state() == PoolState::Running {
            self.join();
        }
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .field("size", &self.size())
            .field("idle", &self.idle_count())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Counter;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    fn eventually(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..500 {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_push_returns_result() {
        let pool = Pool::new(2).unwrap();
        let handle = pool.push(|_| "hello".len()).unwrap();
        assert_eq!(handle.wait(), Ok(5));
    }

    #[test]
    fn test_task_receives_worker_index() {
        let pool = Pool::new(3).unwrap();
        let handles: Vec<_> = (0..30).map(|_| pool.push(|worker| worker).unwrap()).collect();

        for handle in handles {
            let worker = handle.wait().unwrap();
            assert!(worker < 3);
        }
    }

    #[test]
    fn test_workers_are_named() {
        let pool = Pool::with_config(PoolConfig {
            threads: 1,
            name: "pool-test".to_string(),
            stack_size: Some(256 * 1024),
        })
        .unwrap();

        let name = pool
            .push(|_| thread::current().name().map(str::to_string))
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(name.as_deref(), Some("pool-test-0"));
    }

    #[test]
    fn test_panic_does_not_kill_worker() {
        let pool = Pool::new(1).unwrap();

        let failed = pool.push(|_| -> u8 { panic!("task failed") }).unwrap();
        match failed.wait() {
            Err(TaskError::Panicked { worker, message }) => {
                assert_eq!(worker, 0);
                assert_eq!(message, "task failed");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let ok = pool.push(|_| 7u8).unwrap();
        assert_eq!(ok.wait(), Ok(7));
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn test_join_drains_queue() {
        let pool = Pool::new(2).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let done = Arc::clone(&done);
            pool.push(move |_| {
                done.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }

        pool.join();
        assert_eq!(done.load(Ordering::Relaxed), 100);
        assert_eq!(pool.state(), PoolState::Stopped);
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn test_join_is_idempotent() {
        let pool = Pool::new(2).unwrap();
        pool.join();
        pool.join();
        assert_eq!(pool.state(), PoolState::Stopped);
    }

    #[test]
    fn test_closed_after_join() {
        let pool = Pool::new(1).unwrap();
        pool.join();

        assert!(matches!(pool.push(|_| ()), Err(PoolError::Closed)));
        assert!(matches!(pool.resize(4), Err(PoolError::Closed)));
    }

    #[test]
    fn test_terminate_discards_queued_tasks() {
        let pool = Pool::new(1).unwrap();
        let started = Arc::new(Counter::new(0));
        let release = Arc::new(Counter::new(0));

        let blocker = {
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            pool.push(move |_| {
                started.inc();
                release.wait_eq(1);
            })
            .unwrap()
        };
        let queued: Vec<_> = (0..10).map(|i| pool.push(move |_| i).unwrap()).collect();

        started.wait_eq(1);
        let releaser = {
            let release = Arc::clone(&release);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                release.set(1);
            })
        };

        assert_eq!(pool.terminate(), 10);
        releaser.join().unwrap();

        assert_eq!(blocker.wait(), Ok(()));
        for handle in queued {
            assert_eq!(handle.wait(), Err(TaskError::Cancelled));
        }
        assert_eq!(pool.state(), PoolState::Terminated);
        assert!(pool.state().is_stopped());
    }

    /// One worker parked on `release` inside a task, ten more tasks queued.
    fn blocked_pool() -> (Arc<Pool>, Arc<Counter>, Vec<TaskHandle<usize>>) {
        let pool = Arc::new(Pool::new(1).unwrap());
        let started = Arc::new(Counter::new(0));
        let release = Arc::new(Counter::new(0));

        {
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            pool.push(move |_| {
                started.inc();
                release.wait_eq(1);
            })
            .unwrap();
        }
        let queued = (0..10).map(|i| pool.push(move |_| i).unwrap()).collect();
        started.wait_eq(1);

        (pool, release, queued)
    }

    #[test]
    fn test_concurrent_join_waits_for_drain() {
        let (pool, release, queued) = blocked_pool();

        let first = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.join())
        };
        assert!(eventually(|| pool.state() == PoolState::Draining));

        let second = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.join())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!second.is_finished());
        assert_eq!(pool.pending(), 10);

        release.set(1);
        second.join().unwrap();
        first.join().unwrap();

        assert_eq!(pool.state(), PoolState::Stopped);
        for (i, handle) in queued.into_iter().enumerate() {
            assert_eq!(handle.wait(), Ok(i));
        }
    }

    #[test]
    fn test_terminate_during_join_waits_for_workers() {
        let (pool, release, queued) = blocked_pool();

        let joiner = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.join())
        };
        assert!(eventually(|| pool.state() == PoolState::Draining));

        let terminator = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.terminate())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!terminator.is_finished());

        release.set(1);
        assert_eq!(terminator.join().unwrap(), 10);
        joiner.join().unwrap();

        assert_eq!(pool.state(), PoolState::Terminated);
        for handle in queued {
            assert_eq!(handle.wait(), Err(TaskError::Cancelled));
        }
    }

    #[test]
    fn test_pushes_racing_join_always_resolve() {
        for _ in 0..20 {
            let pool = Arc::new(Pool::new(2).unwrap());

            let pushers: Vec<_> = (0..4)
                .map(|_| {
                    let pool = Arc::clone(&pool);
                    thread::spawn(move || {
                        let mut handles = Vec::new();
                        while let Ok(handle) = pool.push(|worker| worker) {
                            handles.push(handle);
                        }
                        handles
                    })
                })
                .collect();

            thread::sleep(Duration::from_millis(1));
            pool.join();

            for pusher in pushers {
                for handle in pusher.join().unwrap() {
                    assert!(handle.wait_timeout(Duration::from_secs(5)).is_some());
                }
            }
            assert_eq!(pool.pending(), 0);
        }
    }

    #[test]
    fn test_join_without_workers_cancels_queue() {
        let pool = Pool::new(0).unwrap();
        let handle = pool.push(|_| 1).unwrap();

        pool.join();
        assert_eq!(pool.state(), PoolState::Stopped);
        assert_eq!(handle.try_wait(), Some(Err(TaskError::Cancelled)));
    }

    #[test]
    fn test_join_after_terminate_keeps_terminated() {
        let pool = Pool::new(2).unwrap();
        pool.terminate();
        pool.join();
        assert_eq!(pool.state(), PoolState::Terminated);
    }

    #[test]
    fn test_resize_grow_and_shrink() {
        let pool = Pool::new(2).unwrap();

        assert!(pool.resize(5).unwrap().is_empty());
        assert_eq!(pool.size(), 5);

        let released = pool.resize(1).unwrap();
        assert_eq!(pool.size(), 1);
        let mut indices: Vec<_> = released.iter().map(ReleasedWorker::index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![1, 2, 3, 4]);

        assert!(eventually(|| released.iter().all(ReleasedWorker::is_finished)));

        let handle = pool.push(|worker| worker).unwrap();
        assert_eq!(handle.wait(), Ok(0));
    }

    #[test]
    fn test_idle_count_reaches_size() {
        let pool = Pool::new(3).unwrap();
        assert!(eventually(|| pool.idle_count() == 3));
    }

    #[test]
    fn test_clear_queue_without_workers() {
        let pool = Pool::new(0).unwrap();
        let handles: Vec<_> = (0..3).map(|i| pool.push(move |_| i).unwrap()).collect();

        assert_eq!(pool.pending(), 3);
        assert_eq!(pool.clear_queue(), 3);
        assert_eq!(pool.pending(), 0);
        for handle in &handles {
            assert_eq!(handle.try_wait(), Some(Err(TaskError::Cancelled)));
        }

        pool.resize(1).unwrap();
        assert_eq!(pool.push(|_| 9).unwrap().wait(), Ok(9));
    }

    #[test]
    fn test_drop_joins_running_pool() {
        let done = Arc::new(AtomicUsize::new(0));
        {
            let pool = Pool::new(2).unwrap();
            for _ in 0..20 {
                let done = Arc::clone(&done);
                pool.push(move |_| {
                    thread::sleep(Duration::from_millis(1));
                    done.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap();
            }
        }
        assert_eq!(done.load(Ordering::Relaxed), 20);
    }

    #[test]
    fn test_default_config_uses_cpu_count() {
        let config = PoolConfig::default();
        assert_eq!(config.threads, num_cpus::get());
        assert_eq!(config.name, "spindle-worker");
    }
}
