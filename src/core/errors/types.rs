//! Error type definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::ConfigError;

/// Boxed error used as the source of capability failures.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Tag identifying the class of an error.
///
/// Task outcomes and serialized records carry this tag so callers can branch on
/// the failure class without matching on the full error value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A worker failed to start its inference session.
    Initialization,
    /// An input file could not be decoded.
    Decode,
    /// The inference capability reported a failure.
    Inference,
    /// A task exceeded its time budget.
    Timeout,
    /// More files were submitted than the queue accepts.
    QueueOverflow,
    /// A task was discarded because the pool shut down.
    Cancellation,
    /// A task was refused because memory stayed above the ceiling.
    MemoryPressure,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Initialization => write!(f, "initialization"),
            ErrorKind::Decode => write!(f, "decode"),
            ErrorKind::Inference => write!(f, "inference"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::QueueOverflow => write!(f, "queue overflow"),
            ErrorKind::Cancellation => write!(f, "cancellation"),
            ErrorKind::MemoryPressure => write!(f, "memory pressure"),
        }
    }
}

/// Error raised when an input file cannot be turned into a pixel buffer.
#[derive(Error, Debug)]
#[error("failed to decode '{file_name}'")]
pub struct DecodeError {
    /// Name of the file that failed to decode.
    pub file_name: String,
    /// The underlying decoder or I/O error.
    #[source]
    pub source: BoxedError,
}

/// Error raised by an inference session.
#[derive(Error, Debug)]
#[error("inference failed: {message}")]
pub struct InferenceError {
    /// A message describing the failure.
    pub message: String,
    /// The underlying engine error, if any.
    #[source]
    pub source: Option<BoxedError>,
}

/// Per-file errors captured in a [`TaskOutcome`](crate::domain::TaskOutcome).
///
/// None of these abort a `process_many` call; each one is local to the file it
/// names.
#[derive(Error, Debug)]
pub enum TaskError {
    /// The input could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The inference capability failed.
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// The task ran longer than its time budget.
    #[error("task for '{file_name}' timed out after {timeout_ms} ms")]
    Timeout {
        /// Name of the file being processed.
        file_name: String,
        /// The budget that was exceeded.
        timeout_ms: u64,
    },

    /// The task was discarded before producing a result.
    #[error("task for '{file_name}' was cancelled: {reason}")]
    Cancelled {
        /// Name of the file that was discarded.
        file_name: String,
        /// Why the task was discarded.
        reason: String,
    },

    /// Admission was refused under the hard memory policy.
    #[error("task for '{file_name}' refused: memory usage {usage_mb} MB exceeds limit {limit_mb} MB")]
    MemoryPressure {
        /// Name of the refused file.
        file_name: String,
        /// Sampled usage at the time of refusal.
        usage_mb: u64,
        /// The configured ceiling.
        limit_mb: u64,
    },
}

/// Pool-level errors that abort the call that raised them.
#[derive(Error, Debug)]
pub enum PoolError {
    /// A worker failed to open its inference session; the pool is left uninitialized.
    #[error("worker {worker_id} failed to initialize")]
    Initialization {
        /// The worker that failed.
        worker_id: usize,
        /// The underlying session error.
        #[source]
        source: InferenceError,
    },

    /// The submission exceeds the queue capacity; nothing was submitted.
    #[error("queue overflow: {requested} files submitted, capacity is {capacity}")]
    QueueOverflow {
        /// Number of files in the rejected call.
        requested: usize,
        /// The configured `max_queue_size`.
        capacity: usize,
    },

    /// The pool has not been initialized, or has been shut down.
    #[error("worker pool is not initialized")]
    NotInitialized,

    /// The configuration is invalid.
    #[error("configuration")]
    Config(#[from] ConfigError),
}
