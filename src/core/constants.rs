//! Constants used throughout the worker pool.
//!
//! These are the defaults applied when a [`PoolConfig`](crate::core::config::PoolConfig)
//! field is left unset.

/// Upper bound on the default worker count.
///
/// When no explicit worker count is configured the pool uses the available
/// parallelism of the host, capped at this value.
pub const MAX_DEFAULT_WORKERS: usize = 6;

/// The default soft memory ceiling in megabytes.
pub const DEFAULT_MAX_MEMORY_MB: u64 = 512;

/// The default number of files admitted per batch.
///
/// This bounds how many decoded pixel buffers can be alive at once when
/// processing goes through the batch scheduler.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// The default cap on pending tasks per `process_many` call.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;

/// The default cadence of background cleanup passes.
pub const DEFAULT_GC_INTERVAL_MS: u64 = 30_000;

/// The default time budget for a single task (decode plus inference).
pub const DEFAULT_TASK_TIMEOUT_MS: u64 = 30_000;

/// The default time a worker may take to open its inference session.
pub const DEFAULT_INIT_TIMEOUT_MS: u64 = 60_000;

/// The default grace period for workers to acknowledge a shutdown request.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

/// The default pause applied by the memory governor after a forced cleanup.
pub const DEFAULT_THROTTLE_DELAY_MS: u64 = 50;

/// The default pause between two consecutive batches.
pub const DEFAULT_BATCH_PAUSE_MS: u64 = 10;

/// The default maximum width or height of a decoded pixel buffer.
pub const DEFAULT_MAX_DIMENSION: u32 = 1920;

/// Bytes per megabyte, used when converting sampler readings.
pub const BYTES_PER_MB: u64 = 1024 * 1024;
