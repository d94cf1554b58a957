//! The core module of the worker pool.
//!
//! This module contains the fundamental components shared by every part of the
//! engine:
//! - Configuration management
//! - Constants
//! - Error handling
//! - Capability traits for decoding, inference and memory sampling
//!
//! It also provides re-exports of commonly used types for convenience.

pub mod config;
pub mod constants;
pub mod errors;
pub mod traits;

pub use config::{AdmissionPolicy, ConfigError, ConfigValidator, ConfigValidatorExt, PoolConfig};
pub use constants::*;
pub use errors::{
    DecodeError, ErrorKind, InferenceError, OpaqueError, PoolError, PoolResult, TaskError,
};
pub use traits::{BufferDecoder, InferenceSession, MemorySampler, SessionFactory};
