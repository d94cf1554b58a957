//! Capability traits consumed by the worker pool.
//!
//! The pool itself never decodes images or runs a model directly. It drives
//! four narrow capabilities:
//!
//! ```text
//! ┌──────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │BufferDecoder │───▶│InferenceSession  │───▶│ TaskOutcome     │
//! │• decode      │    │• infer           │    │                 │
//! └──────────────┘    │• release_caches  │    └─────────────────┘
//!                     └──────────────────┘
//!        SessionFactory opens one session per worker.
//!        MemorySampler feeds the memory governor.
//! ```

use crate::core::errors::{DecodeError, InferenceError};
use crate::domain::{InputFile, PixelBuffer, RecognitionResult};

/// Converts an input file into a pixel buffer.
///
/// One decoder is shared by every worker, so implementations must be
/// thread-safe.
pub trait BufferDecoder: Send + Sync {
    /// Decode `file` into a buffer ready for inference.
    fn decode(&self, file: &InputFile) -> Result<PixelBuffer, DecodeError>;
}

/// An inference session owned exclusively by one worker.
///
/// Sessions are opened inside their worker thread and never leave it, so they
/// need not be `Send`.
pub trait InferenceSession {
    /// Recognize the text in `buffer`.
    fn infer(&mut self, buffer: &PixelBuffer) -> Result<RecognitionResult, InferenceError>;

    /// Drop any caches or scratch memory the session holds.
    ///
    /// Called on every cleanup pass. The default does nothing.
    fn release_caches(&mut self) {}

    /// Describes the engine behind this session, for logging.
    fn engine_info(&self) -> String {
        "inference session".to_string()
    }
}

/// Opens inference sessions for workers.
pub trait SessionFactory: Send + Sync {
    /// Opens a session for `worker_id`.
    fn create(&self, worker_id: usize) -> Result<Box<dyn InferenceSession>, InferenceError>;
}

impl<F> SessionFactory for F
where
    F: Fn(usize) -> Result<Box<dyn InferenceSession>, InferenceError> + Send + Sync,
{
    fn create(&self, worker_id: usize) -> Result<Box<dyn InferenceSession>, InferenceError> {
        self(worker_id)
    }
}

/// Samples the approximate memory footprint of the process.
pub trait MemorySampler: Send + Sync {
    /// Returns resident memory in bytes, or `None` if it cannot be measured.
    fn sample(&self) -> Option<u64>;
}

impl<F> MemorySampler for F
where
    F: Fn() -> Option<u64> + Send + Sync,
{
    fn sample(&self) -> Option<u64> {
        self()
    }
}
