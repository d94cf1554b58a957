//! Error constructor utilities.
//!
//! Capability implementations outside this crate build [`DecodeError`] and
//! [`InferenceError`] values through these helpers, and the pool uses them to
//! translate internal conditions into per-file [`TaskError`]s.
//!
//! ```rust
//! use oar_ocr_pool::core::{ErrorKind, InferenceError, TaskError};
//!
//! let error: TaskError = InferenceError::new("session returned no output").into();
//! assert_eq!(error.kind(), ErrorKind::Inference);
//! ```

use super::types::{BoxedError, DecodeError, ErrorKind, InferenceError, PoolError, TaskError};

/// Plain message error used when there is no underlying cause to chain.
#[derive(Debug)]
pub struct OpaqueError(pub String);

impl std::fmt::Display for OpaqueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for OpaqueError {}

impl DecodeError {
    /// Creates a decode error for `file_name` caused by `error`.
    pub fn new(
        file_name: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            source: Box::new(error),
        }
    }

    /// Creates a decode error with a plain message as its cause.
    pub fn with_message(file_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(file_name, OpaqueError(message.into()))
    }
}

impl InferenceError {
    /// Creates an inference error with no underlying cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an inference error that chains `error` as its source.
    pub fn with_source(
        message: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(error) as BoxedError),
        }
    }

    /// Builds the error reported when a session panics mid-call.
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::new(format!("inference session panicked: {detail}"))
    }
}

impl TaskError {
    /// Creates a timeout error for `file_name`.
    pub fn timeout(file_name: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            file_name: file_name.into(),
            timeout_ms,
        }
    }

    /// Creates a cancellation error for `file_name`.
    pub fn cancelled(file_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Cancelled {
            file_name: file_name.into(),
            reason: reason.into(),
        }
    }

    /// Returns the class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::Decode(_) => ErrorKind::Decode,
            TaskError::Inference(_) => ErrorKind::Inference,
            TaskError::Timeout { .. } => ErrorKind::Timeout,
            TaskError::Cancelled { .. } => ErrorKind::Cancellation,
            TaskError::MemoryPressure { .. } => ErrorKind::MemoryPressure,
        }
    }
}

impl PoolError {
    /// Creates an initialization error for `worker_id`.
    pub fn initialization(worker_id: usize, source: InferenceError) -> Self {
        Self::Initialization { worker_id, source }
    }

    /// Returns the class of this error, if it has one in the task taxonomy.
    ///
    /// Configuration and lifecycle errors have no task-level counterpart.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            PoolError::Initialization { .. } => Some(ErrorKind::Initialization),
            PoolError::QueueOverflow { .. } => Some(ErrorKind::QueueOverflow),
            PoolError::NotInitialized | PoolError::Config(_) => None,
        }
    }
}
