//! Batch scheduling.
//!
//! Large submissions are split into consecutive batches of at most
//! `batch_size` files. Batches run one after another; the next batch starts
//! only after every task of the previous one has an outcome, and a cleanup
//! pass plus a short pause separate them. Within a batch tasks run in
//! parallel up to the worker count.

use crate::core::config::PoolConfig;
use crate::core::errors::{PoolError, TaskError};
use crate::domain::{InputFile, ProgressEvent, ProgressTracker, TaskOutcome};
use std::ops::Range;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runs one batch of files to completion.
///
/// [`WorkerPool::process_batched`](crate::pool::WorkerPool::process_batched)
/// drives the scheduler with its own executor; the scheduler only decides how
/// files are grouped and what happens between groups.
pub trait BatchExecutor {
    /// Processes `files` and returns one outcome per file in input order,
    /// recording each completion in `progress` and reporting it to
    /// `on_progress`.
    fn execute_batch(
        &self,
        files: Vec<InputFile>,
        progress: &mut ProgressTracker,
        on_progress: &mut dyn FnMut(&ProgressEvent),
    ) -> Result<Vec<TaskOutcome>, PoolError>;

    /// Called once between consecutive batches.
    fn between_batches(&self);
}

/// Splits submissions into sequential batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchScheduler {
    batch_size: usize,
    pause: Duration,
}

impl BatchScheduler {
    /// Creates a scheduler. A zero `batch_size` is treated as 1.
    pub fn new(batch_size: usize, pause: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pause,
        }
    }

    /// Creates a scheduler from the pool configuration.
    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.batch_size, config.batch_pause())
    }

    /// Maximum number of files per batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches needed for `total` files.
    pub fn batch_count(&self, total: usize) -> usize {
        total.div_ceil(self.batch_size)
    }

    /// Index ranges of the batches for `total` files.
    ///
    /// Every batch except possibly the last holds exactly `batch_size` files.
    pub fn partition(&self, total: usize) -> Vec<Range<usize>> {
        (0..total)
            .step_by(self.batch_size)
            .map(|start| start..(start + self.batch_size).min(total))
            .collect()
    }

    /// Runs `files` through `executor` batch by batch.
    ///
    /// Outcomes are returned in input order. If the pool shuts down between
    /// batches, the files that never started are reported as cancelled; an
    /// error from the first batch is returned as is.
    pub fn run<E>(
        &self,
        executor: &E,
        files: Vec<InputFile>,
        on_progress: &mut dyn FnMut(&ProgressEvent),
    ) -> Result<Vec<TaskOutcome>, PoolError>
    where
        E: BatchExecutor + ?Sized,
    {
        let total = files.len();
        let ranges = self.partition(total);
        let total_batches = ranges.len();
        let mut progress = ProgressTracker::new(total, total_batches);
        let mut outcomes = Vec::with_capacity(total);
        let mut pending = files.into_iter();

        for (batch_index, range) in ranges.iter().enumerate() {
            progress.enter_batch(batch_index);
            let batch: Vec<InputFile> = pending.by_ref().take(range.len()).collect();
            let names: Vec<String> = batch.iter().map(|f| f.name().to_string()).collect();
            info!(
                "Processing batch {}/{} ({} files)",
                batch_index + 1,
                total_batches,
                batch.len()
            );

            match executor.execute_batch(batch, &mut progress, on_progress) {
                Ok(batch_outcomes) => outcomes.extend(batch_outcomes),
                Err(PoolError::NotInitialized) if batch_index > 0 => {
                    let rest: Vec<String> = pending.map(|f| f.name().to_string()).collect();
                    warn!(
                        "Pool shut down during a batched run; cancelling {} files",
                        names.len() + rest.len()
                    );
                    for name in names.into_iter().chain(rest) {
                        let error = TaskError::cancelled(name.clone(), "pool shut down");
                        let outcome = TaskOutcome::failed(name, error, 0);
                        on_progress(&progress.record(&outcome));
                        outcomes.push(outcome);
                    }
                    return Ok(outcomes);
                }
                Err(e) => return Err(e),
            }

            if batch_index + 1 < total_batches {
                executor.between_batches();
                if !self.pause.is_zero() {
                    thread::sleep(self.pause);
                }
            }
        }

        debug!(
            "Batched run finished: {} succeeded, {} failed",
            progress.succeeded(),
            progress.failed()
        );
        Ok(outcomes)
    }
}
