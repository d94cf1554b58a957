//! Configuration error types and validation traits.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A size or count that must be positive was zero.
    #[error("{field} must be greater than 0")]
    ZeroValue {
        /// Name of the offending field.
        field: &'static str,
    },

    /// Error indicating that a configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// A message describing the problem.
        message: String,
    },

    /// Error indicating that a resource limit has been exceeded.
    #[error("resource limit exceeded: {message}")]
    ResourceLimitExceeded {
        /// A message describing the exceeded limit.
        message: String,
    },

    /// The configuration file could not be read.
    #[error("failed to read configuration file {path}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// The I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration could not be parsed.
    #[error("failed to parse configuration")]
    Parse(#[from] serde_json::Error),
}

/// A trait for validating configuration parameters.
///
/// Implementors provide [`validate`](ConfigValidator::validate); the provided
/// methods cover the checks shared by pool settings.
pub trait ConfigValidator {
    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError>;

    /// Returns the default configuration.
    fn get_defaults() -> Self
    where
        Self: Sized;

    /// Validates that a count or size is greater than zero.
    fn validate_positive_usize(&self, value: usize, field: &'static str) -> Result<(), ConfigError> {
        if value == 0 {
            Err(ConfigError::ZeroValue { field })
        } else {
            Ok(())
        }
    }

    /// Validates that a duration or limit is greater than zero.
    fn validate_positive_u64(&self, value: u64, field: &'static str) -> Result<(), ConfigError> {
        if value == 0 {
            Err(ConfigError::ZeroValue { field })
        } else {
            Ok(())
        }
    }

    /// Validates thread count.
    ///
    /// This method checks that the thread count is reasonable.
    fn validate_thread_count(&self, thread_count: usize) -> Result<(), ConfigError> {
        const MAX_REASONABLE_THREADS: usize = 256;

        if thread_count == 0 {
            Err(ConfigError::ZeroValue {
                field: "worker_count",
            })
        } else if thread_count > MAX_REASONABLE_THREADS {
            Err(ConfigError::ResourceLimitExceeded {
                message: format!(
                    "Worker count {} exceeds reasonable maximum of {}",
                    thread_count, MAX_REASONABLE_THREADS
                ),
            })
        } else {
            Ok(())
        }
    }

    /// Validates a memory ceiling.
    fn validate_memory_limit(&self, limit_mb: u64) -> Result<(), ConfigError> {
        const MAX_REASONABLE_MEMORY_MB: u64 = 1024 * 1024; // 1 TB

        if limit_mb == 0 {
            Err(ConfigError::ZeroValue {
                field: "max_memory_mb",
            })
        } else if limit_mb > MAX_REASONABLE_MEMORY_MB {
            Err(ConfigError::ResourceLimitExceeded {
                message: format!(
                    "Memory limit {} MB exceeds reasonable maximum of {} MB",
                    limit_mb, MAX_REASONABLE_MEMORY_MB
                ),
            })
        } else {
            Ok(())
        }
    }
}

/// Extension trait that validates and hands the value back.
pub trait ConfigValidatorExt: ConfigValidator {
    /// Validates the configuration and returns it unchanged on success.
    fn validated(self) -> Result<Self, ConfigError>
    where
        Self: Sized,
    {
        self.validate()?;
        Ok(self)
    }
}

impl<T: ConfigValidator> ConfigValidatorExt for T {}
