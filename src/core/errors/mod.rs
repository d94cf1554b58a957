//! Error types for the worker pool.
//!
//! Errors fall into two groups. [`PoolError`] values abort the call that raised
//! them (`initialize`, an oversized `process_many`). [`TaskError`] values are
//! local to one file and are captured in that file's outcome.
//!
//! # Usage
//!
//! ```rust
//! use oar_ocr_pool::core::errors::{DecodeError, ErrorKind, TaskError};
//!
//! let error = TaskError::from(DecodeError::with_message("page_07.tif", "unsupported format"));
//! assert_eq!(error.kind(), ErrorKind::Decode);
//! ```

pub mod constructors;
pub mod types;

pub use constructors::OpaqueError;
pub use types::{BoxedError, DecodeError, ErrorKind, InferenceError, PoolError, TaskError};

/// Convenient result alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
