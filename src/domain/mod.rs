//! Domain-level structures shared across the worker pool.
//!
//! This module groups the data that flows through the engine: input files and
//! tasks, decoded pixel buffers, recognition results and their geometry, and
//! the per-file outcomes and progress events returned to callers.

pub mod buffer;
pub mod geometry;
pub mod outcome;
pub mod recognition;
pub mod task;

pub use buffer::{PixelBuffer, PixelFormat};
pub use geometry::{BoundingBox, Point};
pub use outcome::{OutcomeRecord, ProgressEvent, ProgressTracker, TaskOutcome};
pub use recognition::RecognitionResult;
pub use task::{FileSource, InputFile, Task, TaskId};
