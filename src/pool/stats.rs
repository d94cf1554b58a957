//! Pool statistics.
//!
//! `TaskCounters` accumulates per-task totals across calls, guarded by
//! `StatsManager`. `PoolStats` is the point-in-time snapshot returned by
//! [`WorkerPool::stats`](crate::pool::WorkerPool::stats), combining those
//! counters with worker occupancy and the memory governor's state.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::time::SystemTime;

/// Running totals over every task the pool has finished.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskCounters {
    /// Tasks that produced an outcome, whether successful or not.
    pub total_processed: usize,
    /// Tasks whose outcome carries an error.
    pub total_errors: usize,
    /// Tasks that failed by exceeding their time budget.
    pub timeouts: usize,
    /// Mean processing time over all processed tasks.
    pub average_processing_time_ms: f64,
}

impl TaskCounters {
    /// Returns the success rate as a percentage (0.0 to 100.0).
    pub fn success_rate(&self) -> f64 {
        if self.total_processed == 0 {
            0.0
        } else {
            let succeeded = self.total_processed - self.total_errors;
            (succeeded as f64 / self.total_processed as f64) * 100.0
        }
    }
}

/// Snapshot of the pool's state.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    /// Whether the pool currently accepts work.
    pub is_initialized: bool,
    /// Number of worker slots.
    pub total_workers: usize,
    /// Workers waiting for a task.
    pub available_workers: usize,
    /// Workers running a task or being restarted.
    pub busy_workers: usize,
    /// Tasks waiting for a worker.
    pub queued_tasks: usize,
    /// Capacity of the task queue.
    pub max_queue_size: usize,
    /// Task totals accumulated across calls.
    #[serde(flatten)]
    pub counters: TaskCounters,
    /// Percentage of processed tasks that succeeded.
    pub success_rate: f64,
    /// Sampled process memory in megabytes, if a sampler is available.
    pub memory_usage_mb: Option<f64>,
    /// Number of cleanup passes run so far.
    pub cleanup_count: u64,
    /// When the last cleanup pass ran.
    pub last_cleanup: Option<SystemTime>,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Worker Pool Statistics:")?;
        writeln!(f, "  Initialized: {}", self.is_initialized)?;
        writeln!(
            f,
            "  Workers: {} total, {} available, {} busy",
            self.total_workers, self.available_workers, self.busy_workers
        )?;
        writeln!(f, "  Queued: {}/{}", self.queued_tasks, self.max_queue_size)?;
        writeln!(f, "  Total processed: {}", self.counters.total_processed)?;
        writeln!(
            f,
            "  Errors: {} ({} timeouts)",
            self.counters.total_errors, self.counters.timeouts
        )?;
        writeln!(f, "  Success rate: {:.1}%", self.success_rate)?;
        writeln!(
            f,
            "  Average processing time: {:.2} ms",
            self.counters.average_processing_time_ms
        )?;
        match self.memory_usage_mb {
            Some(mb) => writeln!(f, "  Memory usage: {mb:.1} MB")?,
            None => writeln!(f, "  Memory usage: unavailable")?,
        }
        match self.last_cleanup.and_then(|t| t.elapsed().ok()) {
            Some(ago) => writeln!(
                f,
                "  Cleanups: {} (last {:.1}s ago)",
                self.cleanup_count,
                ago.as_secs_f64()
            )?,
            None => writeln!(f, "  Cleanups: {}", self.cleanup_count)?,
        }
        Ok(())
    }
}

/// Thread-safe manager for the pool's task counters.
#[derive(Debug, Default)]
pub struct StatsManager {
    counters: Mutex<TaskCounters>,
}

impl StatsManager {
    /// Creates a new `StatsManager` with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current counters.
    pub fn counters(&self) -> TaskCounters {
        self.counters.lock().clone()
    }

    /// Records one finished task.
    pub fn record(&self, success: bool, timed_out: bool, processing_time_ms: u64) {
        let mut counters = self.counters.lock();

        let previous_total = counters.total_processed;
        let accumulated = counters.average_processing_time_ms * previous_total as f64;
        counters.total_processed = previous_total + 1;
        counters.average_processing_time_ms =
            (accumulated + processing_time_ms as f64) / counters.total_processed as f64;

        if !success {
            counters.total_errors += 1;
        }
        if timed_out {
            counters.timeouts += 1;
        }
    }

    /// Resets the counters to zero.
    pub fn reset(&self) {
        *self.counters.lock() = TaskCounters::default();
    }
}
