//! The worker pool manager.
//!
//! [`WorkerPool`] owns the workers, the task queue, the memory governor and the
//! batch scheduler. A call to [`WorkerPool::process_many`] runs on the caller's
//! thread: it submits every file, then waits on the pool's event channel,
//! turning each completion into a [`TaskOutcome`] placed at the file's input
//! position.
//!
//! # Lifecycle
//!
//! ```text
//!   new ──initialize──▶ ready ──shutdown──▶ uninitialized
//!          (idempotent)   │  ▲
//!                         ▼  │ completion
//!                  process_many / process_batched
//! ```
//!
//! Task deadlines are enforced by the calling thread. A task that runs past
//! `task_timeout_ms` is recorded as a timeout; its worker thread is abandoned
//! and a fresh worker with a new session takes over the same slot.

use super::batch::{BatchExecutor, BatchScheduler};
use super::dispatch::{Dismantled, Dispatch, Expired, Occupancy};
use super::memory::{
    Admission, CleanupTarget, CleanupTicker, MemoryGovernor, ProcessMemorySampler,
};
use super::stats::{PoolStats, StatsManager};
use super::worker::{PoolEvent, WorkerContext, WorkerHandle, await_init, stop_workers};
use crate::core::config::{ConfigValidator, ConfigValidatorExt, PoolConfig};
use crate::core::errors::{InferenceError, PoolError, PoolResult, TaskError};
use crate::core::traits::{BufferDecoder, MemorySampler, SessionFactory};
use crate::domain::{
    InputFile, ProgressEvent, ProgressTracker, RecognitionResult, Task, TaskId, TaskOutcome,
};
use crate::utils::ImageDecoder;
use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// State shared between the pool and its cleanup ticker.
struct PoolShared {
    dispatch: Mutex<Option<Dispatch>>,
}

impl CleanupTarget for PoolShared {
    fn release_caches(&self) {
        if let Some(dispatch) = self.dispatch.lock().as_ref() {
            dispatch.broadcast_cleanup();
        }
    }
}

enum SamplerChoice {
    Process,
    Custom(Box<dyn MemorySampler>),
    Disabled,
}

/// Builder for [`WorkerPool`].
pub struct WorkerPoolBuilder {
    factory: Arc<dyn SessionFactory>,
    config: PoolConfig,
    decoder: Option<Arc<dyn BufferDecoder>>,
    sampler: SamplerChoice,
}

impl WorkerPoolBuilder {
    /// Sets the pool configuration.
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the default [`ImageDecoder`].
    pub fn decoder(mut self, decoder: impl BufferDecoder + 'static) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    /// Replaces the default [`ProcessMemorySampler`].
    pub fn memory_sampler(mut self, sampler: impl MemorySampler + 'static) -> Self {
        self.sampler = SamplerChoice::Custom(Box::new(sampler));
        self
    }

    /// Disables memory sampling, and with it admission throttling.
    pub fn without_memory_sampler(mut self) -> Self {
        self.sampler = SamplerChoice::Disabled;
        self
    }

    /// Validates the configuration and builds an uninitialized pool.
    pub fn build(self) -> PoolResult<WorkerPool> {
        let config = self.config.validated()?;
        let decoder = self
            .decoder
            .unwrap_or_else(|| Arc::new(ImageDecoder::new(config.max_dimension)));
        let sampler: Option<Box<dyn MemorySampler>> = match self.sampler {
            SamplerChoice::Process => Some(Box::new(ProcessMemorySampler::new())),
            SamplerChoice::Custom(sampler) => Some(sampler),
            SamplerChoice::Disabled => None,
        };
        let governor = MemoryGovernor::new(
            sampler,
            config.max_memory_mb,
            config.admission,
            config.throttle_delay(),
        );

        Ok(WorkerPool {
            scheduler: BatchScheduler::from_config(&config),
            config,
            decoder,
            factory: self.factory,
            governor: Arc::new(governor),
            shared: Arc::new(PoolShared {
                dispatch: Mutex::new(None),
            }),
            stats: StatsManager::new(),
            ticker: Mutex::new(None),
            init: Mutex::new(()),
            runs: Mutex::new(()),
            next_task_id: AtomicU64::new(0),
        })
    }
}

/// A fixed-size pool of OCR workers.
///
/// ```rust,no_run
/// use oar_ocr_pool::prelude::*;
///
/// struct Blank;
///
/// impl InferenceSession for Blank {
///     fn infer(&mut self, _buffer: &PixelBuffer) -> Result<RecognitionResult, InferenceError> {
///         Ok(RecognitionResult::new("", 0.0))
///     }
/// }
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let factory = |_worker: usize| -> Result<Box<dyn InferenceSession>, InferenceError> {
///     Ok(Box::new(Blank))
/// };
/// let pool = WorkerPool::builder(factory).build()?;
/// pool.initialize(Some(2))?;
///
/// let files = vec![InputFile::from_path("scan_001.png")];
/// let outcomes = pool.process_many_with_progress(files, |event| {
///     println!("{}/{} {}", event.completed, event.total, event.file_name);
/// })?;
/// assert_eq!(outcomes.len(), 1);
///
/// pool.shutdown();
/// # Ok(())
/// # }
/// ```
///
/// Calls to `process_many` and `process_batched` on one pool are serialized:
/// a batched call holds the pool from its first batch to its last, so two
/// batched calls never interleave. Progress callbacks run on the calling thread and must not call back into
/// the pool's processing methods.
pub struct WorkerPool {
    config: PoolConfig,
    decoder: Arc<dyn BufferDecoder>,
    factory: Arc<dyn SessionFactory>,
    governor: Arc<MemoryGovernor>,
    shared: Arc<PoolShared>,
    stats: StatsManager,
    scheduler: BatchScheduler,
    ticker: Mutex<Option<CleanupTicker>>,
    init: Mutex<()>,
    runs: Mutex<()>,
    next_task_id: AtomicU64,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("governor", &self.governor)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl WorkerPool {
    /// Starts building a pool whose workers open sessions with `factory`.
    pub fn builder(factory: impl SessionFactory + 'static) -> WorkerPoolBuilder {
        WorkerPoolBuilder {
            factory: Arc::new(factory),
            config: PoolConfig::default(),
            decoder: None,
            sampler: SamplerChoice::Process,
        }
    }

    /// Builds a pool with the default decoder and memory sampler.
    pub fn new(factory: impl SessionFactory + 'static, config: PoolConfig) -> PoolResult<Self> {
        Self::builder(factory).config(config).build()
    }

    /// The configuration this pool was built with.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// The memory governor.
    pub fn governor(&self) -> &MemoryGovernor {
        &self.governor
    }

    /// Returns true between a successful `initialize` and `shutdown`.
    pub fn is_initialized(&self) -> bool {
        self.shared.dispatch.lock().is_some()
    }

    /// Starts the workers and opens one inference session per worker.
    ///
    /// `worker_count` overrides the configured count. Calling this on an
    /// initialized pool does nothing. If any worker fails to start, every
    /// started worker is torn down and the pool stays uninitialized.
    ///
    /// Sessions open without holding the pool's state lock, so `stats` and
    /// `is_initialized` stay responsive during warm-up.
    pub fn initialize(&self, worker_count: Option<usize>) -> PoolResult<()> {
        let _initializing = self.init.lock();
        if self.is_initialized() {
            debug!("Worker pool already initialized");
            return Ok(());
        }

        let count = self.config.resolve_worker_count(worker_count);
        self.config.validate_thread_count(count)?;
        info!("Initializing worker pool with {} workers", count);

        let (events_tx, events_rx) = unbounded();
        let context = WorkerContext {
            decoder: Arc::clone(&self.decoder),
            factory: Arc::clone(&self.factory),
            events: events_tx,
        };

        let mut handles = Vec::with_capacity(count);
        for worker_id in 0..count {
            match WorkerHandle::spawn(worker_id, 0, context.clone()) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    stop_workers(handles, self.config.shutdown_timeout());
                    return Err(PoolError::initialization(worker_id, e));
                }
            }
        }

        // Sessions open concurrently; the deadline covers all of them.
        let replies: Vec<_> = handles.iter().map(|h| (h.id(), h.begin_init())).collect();
        let deadline = Instant::now() + self.config.init_timeout();
        for (worker_id, reply) in replies {
            if let Err(e) = await_init(&reply, deadline) {
                error!("Worker {} failed to initialize: {}", worker_id, e);
                stop_workers(handles, self.config.shutdown_timeout());
                return Err(PoolError::initialization(worker_id, e));
            }
        }

        let mut dispatch = self.shared.dispatch.lock();
        if dispatch.is_some() {
            drop(dispatch);
            debug!("Worker pool was initialized concurrently; stopping spare workers");
            stop_workers(handles, self.config.shutdown_timeout());
            return Ok(());
        }
        *dispatch = Some(Dispatch::new(
            handles,
            self.config.max_queue_size,
            context,
            events_rx,
            self.config.task_timeout(),
        ));
        drop(dispatch);

        let target: Weak<PoolShared> = Arc::downgrade(&self.shared);
        self.governor.attach(target);
        match CleanupTicker::start(Arc::clone(&self.governor), self.config.gc_interval()) {
            Ok(ticker) => *self.ticker.lock() = Some(ticker),
            Err(e) => warn!("Failed to start the cleanup ticker: {}", e),
        }

        info!("Worker pool initialized with {} workers", count);
        Ok(())
    }

    /// Processes up to `max_queue_size` files and returns one outcome per
    /// file, in input order.
    pub fn process_many(&self, files: Vec<InputFile>) -> PoolResult<Vec<TaskOutcome>> {
        self.process_many_with_progress(files, |_| {})
    }

    /// Like [`process_many`](Self::process_many), reporting each completed
    /// file to `on_progress` in completion order.
    ///
    /// Per-file failures land in the outcome list. The call itself fails only
    /// if the pool is not initialized or more than `max_queue_size` files are
    /// submitted, in which case nothing is processed.
    pub fn process_many_with_progress<F>(
        &self,
        files: Vec<InputFile>,
        mut on_progress: F,
    ) -> PoolResult<Vec<TaskOutcome>>
    where
        F: FnMut(&ProgressEvent),
    {
        self.check_capacity(files.len())?;
        let total_batches = usize::from(!files.is_empty());
        let mut progress = ProgressTracker::new(files.len(), total_batches);
        let _serialized = self.runs.lock();
        self.run_tasks(files, &mut progress, &mut on_progress)
    }

    /// Processes any number of files in sequential batches of `batch_size`,
    /// with a cleanup pass between batches.
    pub fn process_batched<F>(
        &self,
        files: Vec<InputFile>,
        mut on_progress: F,
    ) -> PoolResult<Vec<TaskOutcome>>
    where
        F: FnMut(&ProgressEvent),
    {
        if !self.is_initialized() {
            return Err(PoolError::NotInitialized);
        }
        let _serialized = self.runs.lock();
        self.scheduler.run(&SerializedRun(self), files, &mut on_progress)
    }

    /// Returns a snapshot of the pool's state.
    pub fn stats(&self) -> PoolStats {
        let (is_initialized, occupancy) = match self.shared.dispatch.lock().as_ref() {
            Some(dispatch) => (true, dispatch.occupancy()),
            None => (false, Occupancy::default()),
        };

        let counters = self.stats.counters();
        PoolStats {
            is_initialized,
            total_workers: occupancy.total,
            available_workers: occupancy.available,
            busy_workers: occupancy.busy,
            queued_tasks: occupancy.queued,
            max_queue_size: self.config.max_queue_size,
            success_rate: counters.success_rate(),
            counters,
            memory_usage_mb: self.governor.usage_mb(),
            cleanup_count: self.governor.cleanup_count(),
            last_cleanup: self.governor.last_cleanup(),
        }
    }

    /// Runs a cleanup pass immediately.
    pub fn force_cleanup(&self) {
        self.governor.force_cleanup();
    }

    /// Stops accepting work and shuts the workers down.
    ///
    /// Queued tasks and tasks still running when the grace period ends are
    /// reported as cancelled to the call that submitted them. Workers that do
    /// not exit within `shutdown_timeout_ms` are abandoned. Safe to call more
    /// than once.
    pub fn shutdown(&self) {
        let dispatch = self.shared.dispatch.lock().take();
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.stop();
        }
        self.governor.detach();

        let Some(dispatch) = dispatch else {
            return;
        };
        let Dismantled {
            queued,
            in_flight,
            workers,
            context,
        } = dispatch.dismantle();
        info!(
            "Shutting down worker pool: {} workers, {} queued tasks",
            workers.len(),
            queued.len()
        );

        for task in queued {
            let _ = context.events.send(PoolEvent::Cancelled {
                task_id: task.id,
                reason: "pool shut down before the task started".to_string(),
            });
        }

        let forced = stop_workers(workers, self.config.shutdown_timeout());

        // Tasks whose workers finished first already have a completion queued
        // ahead of these.
        for task in in_flight {
            let _ = context.events.send(PoolEvent::Cancelled {
                task_id: task.task_id,
                reason: "pool shut down while the task was running".to_string(),
            });
        }

        if forced > 0 {
            warn!("{} workers were force-terminated during shutdown", forced);
        }
        info!("Worker pool shut down");
    }

    fn check_capacity(&self, requested: usize) -> PoolResult<()> {
        if requested > self.config.max_queue_size {
            return Err(PoolError::QueueOverflow {
                requested,
                capacity: self.config.max_queue_size,
            });
        }
        Ok(())
    }

    fn run_tasks(
        &self,
        files: Vec<InputFile>,
        progress: &mut ProgressTracker,
        on_progress: &mut dyn FnMut(&ProgressEvent),
    ) -> PoolResult<Vec<TaskOutcome>> {
        let events = match self.shared.dispatch.lock().as_ref() {
            Some(dispatch) => dispatch.events().clone(),
            None => return Err(PoolError::NotInitialized),
        };
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let mut run = Run::new(files.len(), progress, on_progress, &self.stats);

        for (index, file) in files.into_iter().enumerate() {
            let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
            let file_name = file.name().to_string();
            run.register(task_id, index, file_name.clone());

            if let Admission::Rejected { usage_mb, limit_mb } = self.governor.check_and_throttle() {
                let error = TaskError::MemoryPressure {
                    file_name,
                    usage_mb,
                    limit_mb,
                };
                run.finish(task_id, Err(error), 0);
                continue;
            }

            let submitted = match self.shared.dispatch.lock().as_mut() {
                Some(dispatch) => dispatch.submit(Task::new(task_id, index, file)),
                None => Err(PoolError::NotInitialized),
            };
            if let Err(e) = submitted {
                run.finish(task_id, Err(TaskError::cancelled(file_name, e.to_string())), 0);
            }

            self.drain_ready(&events, &mut run);
        }

        while !run.is_done() {
            let deadline = self
                .shared
                .dispatch
                .lock()
                .as_ref()
                .and_then(Dispatch::next_deadline);
            let received = match deadline {
                Some(deadline) => events.recv_deadline(deadline),
                None => events.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(event) => self.handle_event(event, &mut run),
                Err(RecvTimeoutError::Timeout) => self.expire_overdue(&mut run),
                Err(RecvTimeoutError::Disconnected) => {
                    run.cancel_remaining("worker pool stopped");
                }
            }
        }

        let outcomes = run.into_outcomes();
        debug!("Processed {} files", outcomes.len());
        Ok(outcomes)
    }

    /// Handles completions that are already waiting without blocking.
    fn drain_ready(&self, events: &Receiver<PoolEvent>, run: &mut Run<'_>) {
        while let Ok(event) = events.try_recv() {
            self.handle_event(event, run);
        }
    }

    fn handle_event(&self, event: PoolEvent, run: &mut Run<'_>) {
        match event {
            PoolEvent::Completed {
                worker_id,
                generation,
                task_id,
                response,
                elapsed,
            } => {
                // After shutdown there is no occupancy left to update; the
                // first event for a task still wins.
                let accepted = match self.shared.dispatch.lock().as_mut() {
                    Some(dispatch) => dispatch.complete(worker_id, generation, task_id),
                    None => true,
                };
                if accepted {
                    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                    run.finish(task_id, response.into_result(), elapsed_ms);
                } else {
                    debug!(
                        "Ignoring stale completion of task {} from worker {} generation {}",
                        task_id, worker_id, generation
                    );
                }
            }
            PoolEvent::Cancelled { task_id, reason } => run.cancel(task_id, &reason),
        }
    }

    fn expire_overdue(&self, run: &mut Run<'_>) {
        let expired = match self.shared.dispatch.lock().as_mut() {
            Some(dispatch) => dispatch.take_expired(Instant::now()),
            None => return,
        };

        let timeout_ms = self.config.task_timeout_ms;
        for Expired {
            worker_id,
            next_generation,
            task,
            handle,
        } in expired
        {
            if task.lost {
                let error = InferenceError::new("worker thread exited before the task started");
                run.finish(task.task_id, Err(error.into()), 0);
            } else {
                warn!(
                    "Task '{}' exceeded {} ms on worker {}; replacing the worker",
                    task.file_name, timeout_ms, worker_id
                );
                run.finish(
                    task.task_id,
                    Err(TaskError::timeout(task.file_name, timeout_ms)),
                    timeout_ms,
                );
            }
            if let Some(handle) = handle {
                handle.abandon();
            }
            self.restart_worker(worker_id, next_generation, run);
        }
    }

    /// Starts a fresh worker in `worker_id`'s slot. If that fails the slot is
    /// retired; when no workers remain, queued tasks are cancelled.
    fn restart_worker(&self, worker_id: usize, generation: u64, run: &mut Run<'_>) {
        let Some(context) = self
            .shared
            .dispatch
            .lock()
            .as_ref()
            .map(|dispatch| dispatch.context().clone())
        else {
            return;
        };

        let started = WorkerHandle::spawn(worker_id, generation, context).and_then(|handle| {
            match handle.initialize(self.config.init_timeout()) {
                Ok(_) => Ok(handle),
                Err(e) => {
                    stop_workers(vec![handle], self.config.shutdown_timeout());
                    Err(e)
                }
            }
        });

        let mut leftover = None;
        let orphaned = match self.shared.dispatch.lock().as_mut() {
            Some(dispatch) => match started {
                Ok(handle) => {
                    info!("Worker {} restarted (generation {})", worker_id, generation);
                    dispatch.install(handle);
                    Vec::new()
                }
                Err(e) => {
                    error!("Worker {} could not be restarted: {}", worker_id, e);
                    dispatch.retire(worker_id)
                }
            },
            None => {
                leftover = started.ok();
                Vec::new()
            }
        };

        if let Some(handle) = leftover {
            stop_workers(vec![handle], self.config.shutdown_timeout());
        }
        if !orphaned.is_empty() {
            warn!("No workers remain; cancelling {} queued tasks", orphaned.len());
        }
        for task in orphaned {
            run.cancel(task.id, "no workers remain");
        }
    }
}

/// Runs batches for a `process_batched` call that already holds the run lock.
struct SerializedRun<'p>(&'p WorkerPool);

impl BatchExecutor for SerializedRun<'_> {
    fn execute_batch(
        &self,
        files: Vec<InputFile>,
        progress: &mut ProgressTracker,
        on_progress: &mut dyn FnMut(&ProgressEvent),
    ) -> PoolResult<Vec<TaskOutcome>> {
        self.0.check_capacity(files.len())?;
        self.0.run_tasks(files, progress, on_progress)
    }

    fn between_batches(&self) {
        self.0.force_cleanup();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Outcome accumulator for one call.
struct Run<'a> {
    outcomes: Vec<Option<TaskOutcome>>,
    pending: HashMap<TaskId, (usize, String)>,
    progress: &'a mut ProgressTracker,
    on_progress: &'a mut dyn FnMut(&ProgressEvent),
    stats: &'a StatsManager,
}

impl<'a> Run<'a> {
    fn new(
        len: usize,
        progress: &'a mut ProgressTracker,
        on_progress: &'a mut dyn FnMut(&ProgressEvent),
        stats: &'a StatsManager,
    ) -> Self {
        Self {
            outcomes: std::iter::repeat_with(|| None).take(len).collect(),
            pending: HashMap::with_capacity(len),
            progress,
            on_progress,
            stats,
        }
    }

    fn register(&mut self, task_id: TaskId, index: usize, file_name: String) {
        self.pending.insert(task_id, (index, file_name));
    }

    fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    /// Records the outcome of `task_id`. Later reports for the same task are
    /// ignored.
    fn finish(
        &mut self,
        task_id: TaskId,
        result: Result<RecognitionResult, TaskError>,
        processing_time_ms: u64,
    ) {
        let Some((index, file_name)) = self.pending.remove(&task_id) else {
            return;
        };
        let timed_out = matches!(result, Err(TaskError::Timeout { .. }));
        let outcome = match result {
            Ok(result) => TaskOutcome::completed(file_name, result, processing_time_ms),
            Err(error) => TaskOutcome::failed(file_name, error, processing_time_ms),
        };

        self.stats.record(outcome.success(), timed_out, processing_time_ms);
        (self.on_progress)(&self.progress.record(&outcome));
        self.outcomes[index] = Some(outcome);
    }

    fn cancel(&mut self, task_id: TaskId, reason: &str) {
        let Some((_, file_name)) = self.pending.get(&task_id) else {
            return;
        };
        let error = TaskError::cancelled(file_name.clone(), reason);
        self.finish(task_id, Err(error), 0);
    }

    /// Cancels every unfinished task, in input order.
    fn cancel_remaining(&mut self, reason: &str) {
        let mut remaining: Vec<(usize, TaskId)> = self
            .pending
            .iter()
            .map(|(&task_id, &(index, _))| (index, task_id))
            .collect();
        remaining.sort_unstable();
        for (_, task_id) in remaining {
            self.cancel(task_id, reason);
        }
    }

    fn into_outcomes(self) -> Vec<TaskOutcome> {
        self.outcomes.into_iter().flatten().collect()
    }
}
