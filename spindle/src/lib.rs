//! Concurrency building blocks for native threads.
//!
//! - [`queue`] - a bounded lock-free multi-producer multi-consumer queue
//! - [`pool`] - a resizable pool of worker threads with per-task result handles
//! - [`gate`] - mutex/condvar values threads can block on until a predicate holds
//! - [`locked`] - plain mutex-guarded FIFO queue and LIFO stack
//!
//! Logging goes through `tracing` when the `tracing` feature is enabled; see
//! [`init_tracing`].

pub mod gate;
pub mod locked;
pub mod pool;
pub mod queue;
pub mod timeout;

mod trace;

pub use gate::{Barrier, Counter, Notify, NotifyValue};
pub use locked::{LockedQueue, LockedStack};
pub use pool::{Pool, PoolConfig, PoolError, PoolState, ReleasedWorker, TaskError, TaskHandle};
pub use queue::{Queue, QueueError};
pub use timeout::Timeout;
pub use trace::init_tracing;
