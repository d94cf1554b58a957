//! Configuration management for the worker pool.
//!
//! This module provides the pool configuration type together with the
//! validation traits used to check it.

pub mod errors;
pub mod pool;

pub use errors::{ConfigError, ConfigValidator, ConfigValidatorExt};
pub use pool::{AdmissionPolicy, PoolConfig};
