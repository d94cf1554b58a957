//! The bounded-concurrency processing engine.
//!
//! * [`WorkerPool`] - lifecycle, submission, stats and shutdown
//! * [`BatchScheduler`] - sequential fixed-size batches
//! * [`MemoryGovernor`] - admission throttling and cleanup passes
//! * [`TaskQueue`] - bounded FIFO of waiting tasks
//! * [`worker`] - worker threads and their message protocol

pub mod batch;
mod dispatch;
pub mod manager;
pub mod memory;
pub mod queue;
pub mod stats;
pub mod worker;

pub use batch::{BatchExecutor, BatchScheduler};
pub use manager::{WorkerPool, WorkerPoolBuilder};
pub use memory::{Admission, CleanupTarget, MemoryGovernor, ProcessMemorySampler};
pub use queue::TaskQueue;
pub use stats::{PoolStats, StatsManager, TaskCounters};
pub use worker::{PoolEvent, WorkerRequest, WorkerResponse};
