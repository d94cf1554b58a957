//! # OAR OCR Pool
//!
//! A bounded-concurrency engine that spreads OCR work across a fixed pool of
//! worker threads under an explicit memory budget.
//!
//! ## Features
//!
//! - Fixed worker pool, one inference session per worker
//! - Bounded FIFO task queue with backpressure
//! - Memory-aware admission with cleanup passes
//! - Sequential batching for large submissions
//! - Per-file outcomes in input order, with progress events
//! - Per-task timeouts with automatic worker replacement
//!
//! ## Modules
//!
//! * [`core`] - Configuration, errors, and the capability traits
//! * [`domain`] - Files, tasks, buffers, results and outcomes
//! * [`pool`] - The worker pool, scheduler and memory governor
//! * [`utils`] - Image decoding and logging setup
//!
//! ## Quick Start
//!
//! The pool is generic over the recognition engine. Implement
//! [`InferenceSession`](core::InferenceSession) for your model and hand the
//! pool a factory that opens one session per worker:
//!
//! ```rust,no_run
//! use oar_ocr_pool::prelude::*;
//!
//! struct MyModel;
//!
//! impl InferenceSession for MyModel {
//!     fn infer(&mut self, buffer: &PixelBuffer) -> Result<RecognitionResult, InferenceError> {
//!         Ok(RecognitionResult::new(
//!             format!("{}x{} page", buffer.width(), buffer.height()),
//!             95.0,
//!         ))
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! oar_ocr_pool::utils::init_tracing();
//!
//! let config = PoolConfig::new().with_batch_size(4).with_max_memory_mb(1024);
//! let pool = WorkerPool::builder(|_worker: usize| -> Result<Box<dyn InferenceSession>, InferenceError> {
//!     Ok(Box::new(MyModel))
//! })
//! .config(config)
//! .build()?;
//! pool.initialize(None)?;
//!
//! let files: Vec<InputFile> = ["page_1.png", "page_2.png"]
//!     .into_iter()
//!     .map(InputFile::from_path)
//!     .collect();
//! let outcomes = pool.process_batched(files, |event| {
//!     println!(
//!         "[batch {}/{}] {}/{} {}",
//!         event.batch_index + 1,
//!         event.total_batches,
//!         event.completed,
//!         event.total,
//!         event.file_name
//!     );
//! })?;
//!
//! let failed = outcomes.iter().filter(|o| !o.success()).count();
//! println!("{} of {} documents processed", outcomes.len() - failed, outcomes.len());
//! println!("{}", pool.stats());
//! pool.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ### JSON Configuration
//!
//! ```rust,no_run
//! use oar_ocr_pool::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PoolConfig::from_json_file("pool.json")?;
//! # let _ = config;
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod core;
pub mod domain;
pub mod pool;
pub mod utils;

/// Prelude module for convenient imports.
///
/// ```rust
/// use oar_ocr_pool::prelude::*;
/// ```
///
/// Included items cover the common path:
/// - The pool and its configuration (`WorkerPool`, `PoolConfig`, `AdmissionPolicy`)
/// - The capabilities a caller implements (`InferenceSession`, `BufferDecoder`)
/// - Inputs, results and outcomes
/// - Essential error types
pub mod prelude {
    pub use crate::core::{
        AdmissionPolicy, BufferDecoder, DecodeError, ErrorKind, InferenceError, InferenceSession,
        MemorySampler, PoolConfig, PoolError, PoolResult, SessionFactory, TaskError,
    };
    pub use crate::domain::{
        BoundingBox, InputFile, PixelBuffer, PixelFormat, Point, ProgressEvent,
        RecognitionResult, TaskOutcome,
    };
    pub use crate::pool::{PoolStats, WorkerPool};
    pub use crate::utils::ImageDecoder;
}
