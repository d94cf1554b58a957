//! Per-file outcomes and progress events.

use super::recognition::RecognitionResult;
use crate::core::errors::{ErrorKind, TaskError};
use serde::Serialize;

/// The result record for one submitted file.
///
/// Outcome lists returned by the pool are in submission order, so callers can
/// correlate them positionally with their inputs.
#[derive(Debug)]
pub struct TaskOutcome {
    /// Name of the processed file.
    pub file_name: String,
    /// The recognition result, present on success.
    pub result: Option<RecognitionResult>,
    /// The failure, present when the task did not succeed.
    pub error: Option<TaskError>,
    /// Wall time between assignment to a worker and completion.
    pub processing_time_ms: u64,
}

impl TaskOutcome {
    /// Creates a successful outcome.
    pub fn completed(
        file_name: impl Into<String>,
        result: RecognitionResult,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            result: Some(result),
            error: None,
            processing_time_ms,
        }
    }

    /// Creates a failed outcome.
    pub fn failed(
        file_name: impl Into<String>,
        error: TaskError,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            result: None,
            error: Some(error),
            processing_time_ms,
        }
    }

    /// Returns true if the file was recognized.
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    /// The class of the failure, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(TaskError::kind)
    }

    /// Builds a serializable record for result sinks.
    pub fn record(&self) -> OutcomeRecord<'_> {
        OutcomeRecord {
            file_name: &self.file_name,
            success: self.success(),
            result: self.result.as_ref(),
            error_kind: self.error_kind(),
            error_message: self.error.as_ref().map(|e| e.to_string()),
            processing_time_ms: self.processing_time_ms,
        }
    }
}

/// Serializable view of a [`TaskOutcome`].
#[derive(Debug, Serialize)]
pub struct OutcomeRecord<'a> {
    /// Name of the processed file.
    pub file_name: &'a str,
    /// Whether recognition succeeded.
    pub success: bool,
    /// The recognition result, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<&'a RecognitionResult>,
    /// The failure class, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Human-readable failure description, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
}

/// Emitted once per completed file.
///
/// Events fire in completion order, which is not necessarily input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    /// Number of files completed so far, this one included.
    pub completed: usize,
    /// Total number of files in the call.
    pub total: usize,
    /// Name of the file that just completed.
    pub file_name: String,
    /// Whether it succeeded.
    pub success: bool,
    /// The failure class, if it failed.
    pub error: Option<ErrorKind>,
    /// Zero-based index of the batch the file belongs to.
    pub batch_index: usize,
    /// Number of batches in the call.
    pub total_batches: usize,
}

/// Running totals for one call, threaded through the batch loop by mutable
/// reference.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    completed: usize,
    succeeded: usize,
    total: usize,
    batch_index: usize,
    total_batches: usize,
}

impl ProgressTracker {
    /// Creates a tracker for `total` files split into `total_batches` batches.
    pub fn new(total: usize, total_batches: usize) -> Self {
        Self {
            total,
            total_batches,
            ..Self::default()
        }
    }

    /// Moves the tracker to the given batch.
    pub fn enter_batch(&mut self, batch_index: usize) {
        self.batch_index = batch_index;
    }

    /// Counts a completed outcome and returns the event describing it.
    pub fn record(&mut self, outcome: &TaskOutcome) -> ProgressEvent {
        self.completed += 1;
        if outcome.success() {
            self.succeeded += 1;
        }
        ProgressEvent {
            completed: self.completed,
            total: self.total,
            file_name: outcome.file_name.clone(),
            success: outcome.success(),
            error: outcome.error_kind(),
            batch_index: self.batch_index,
            total_batches: self.total_batches,
        }
    }

    /// Files completed so far.
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Files that succeeded so far.
    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Files completed without success so far.
    pub fn failed(&self) -> usize {
        self.completed - self.succeeded
    }
}
