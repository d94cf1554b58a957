//! Worker pool configuration.

use super::errors::{ConfigError, ConfigValidator};
use crate::core::constants::{
    DEFAULT_BATCH_PAUSE_MS, DEFAULT_BATCH_SIZE, DEFAULT_GC_INTERVAL_MS, DEFAULT_INIT_TIMEOUT_MS,
    DEFAULT_MAX_DIMENSION, DEFAULT_MAX_MEMORY_MB, DEFAULT_MAX_QUEUE_SIZE,
    DEFAULT_SHUTDOWN_TIMEOUT_MS, DEFAULT_TASK_TIMEOUT_MS, DEFAULT_THROTTLE_DELAY_MS,
    MAX_DEFAULT_WORKERS,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// What the memory governor does when usage stays above the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AdmissionPolicy {
    /// Run a cleanup pass and pause briefly, then admit the task anyway.
    #[default]
    SoftThrottle,
    /// Run a cleanup pass and pause; if usage is still above the ceiling,
    /// fail the task with a memory-pressure error instead of admitting it.
    HardLimit,
}

/// Configuration for the worker pool and its components.
///
/// Every field has a serde default, so a partial JSON document is enough:
///
/// ```rust
/// use oar_ocr_pool::core::config::PoolConfig;
///
/// let config = PoolConfig::from_json_str(r#"{ "batch_size": 4, "max_queue_size": 40 }"#).unwrap();
/// assert_eq!(config.batch_size, 4);
/// assert_eq!(config.max_memory_mb, 512);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of workers. If None, uses min(available parallelism, 6).
    #[serde(default)]
    pub worker_count: Option<usize>,

    /// Soft memory ceiling in megabytes that triggers a throttled cleanup.
    #[serde(default = "PoolConfig::default_max_memory_mb")]
    pub max_memory_mb: u64,

    /// Maximum number of files admitted per batch.
    #[serde(default = "PoolConfig::default_batch_size")]
    pub batch_size: usize,

    /// Hard cap on pending tasks per `process_many` call.
    #[serde(default = "PoolConfig::default_max_queue_size")]
    pub max_queue_size: usize,

    /// Background cleanup cadence in milliseconds.
    #[serde(default = "PoolConfig::default_gc_interval_ms")]
    pub gc_interval_ms: u64,

    /// Time budget for a single task in milliseconds.
    #[serde(default = "PoolConfig::default_task_timeout_ms")]
    pub task_timeout_ms: u64,

    /// Time a worker may take to open its session in milliseconds.
    #[serde(default = "PoolConfig::default_init_timeout_ms")]
    pub init_timeout_ms: u64,

    /// Grace period for shutdown acknowledgements in milliseconds.
    #[serde(default = "PoolConfig::default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Pause applied after a pressure-triggered cleanup in milliseconds.
    #[serde(default = "PoolConfig::default_throttle_delay_ms")]
    pub throttle_delay_ms: u64,

    /// Pause between consecutive batches in milliseconds.
    #[serde(default = "PoolConfig::default_batch_pause_ms")]
    pub batch_pause_ms: u64,

    /// Maximum width or height of a decoded pixel buffer.
    #[serde(default = "PoolConfig::default_max_dimension")]
    pub max_dimension: u32,

    /// Behavior when memory stays above the ceiling.
    #[serde(default)]
    pub admission: AdmissionPolicy,
}

impl PoolConfig {
    /// Create a new PoolConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from a JSON string and validates it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration from a JSON file and validates it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Set the worker count.
    pub fn with_worker_count(mut self, worker_count: Option<usize>) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the memory ceiling.
    pub fn with_max_memory_mb(mut self, max_memory_mb: u64) -> Self {
        self.max_memory_mb = max_memory_mb;
        self
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the queue capacity.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set the background cleanup interval.
    pub fn with_gc_interval_ms(mut self, gc_interval_ms: u64) -> Self {
        self.gc_interval_ms = gc_interval_ms;
        self
    }

    /// Set the per-task timeout.
    pub fn with_task_timeout_ms(mut self, task_timeout_ms: u64) -> Self {
        self.task_timeout_ms = task_timeout_ms;
        self
    }

    /// Set the session initialization timeout.
    pub fn with_init_timeout_ms(mut self, init_timeout_ms: u64) -> Self {
        self.init_timeout_ms = init_timeout_ms;
        self
    }

    /// Set the shutdown grace period.
    pub fn with_shutdown_timeout_ms(mut self, shutdown_timeout_ms: u64) -> Self {
        self.shutdown_timeout_ms = shutdown_timeout_ms;
        self
    }

    /// Set the throttle pause.
    pub fn with_throttle_delay_ms(mut self, throttle_delay_ms: u64) -> Self {
        self.throttle_delay_ms = throttle_delay_ms;
        self
    }

    /// Set the pause between batches.
    pub fn with_batch_pause_ms(mut self, batch_pause_ms: u64) -> Self {
        self.batch_pause_ms = batch_pause_ms;
        self
    }

    /// Set the maximum decoded dimension.
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    /// Set the admission policy.
    pub fn with_admission(mut self, admission: AdmissionPolicy) -> Self {
        self.admission = admission;
        self
    }

    /// Returns the worker count the pool will start with.
    ///
    /// `requested` overrides the configured value when present.
    pub fn resolve_worker_count(&self, requested: Option<usize>) -> usize {
        requested
            .or(self.worker_count)
            .unwrap_or_else(Self::default_worker_count)
    }

    /// min(available parallelism, 6), falling back to 1 if parallelism is unknown.
    pub fn default_worker_count() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(MAX_DEFAULT_WORKERS)
    }

    pub(crate) fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub(crate) fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub(crate) fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub(crate) fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.gc_interval_ms)
    }

    pub(crate) fn throttle_delay(&self) -> Duration {
        Duration::from_millis(self.throttle_delay_ms)
    }

    pub(crate) fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    fn default_max_memory_mb() -> u64 {
        DEFAULT_MAX_MEMORY_MB
    }

    fn default_batch_size() -> usize {
        DEFAULT_BATCH_SIZE
    }

    fn default_max_queue_size() -> usize {
        DEFAULT_MAX_QUEUE_SIZE
    }

    fn default_gc_interval_ms() -> u64 {
        DEFAULT_GC_INTERVAL_MS
    }

    fn default_task_timeout_ms() -> u64 {
        DEFAULT_TASK_TIMEOUT_MS
    }

    fn default_init_timeout_ms() -> u64 {
        DEFAULT_INIT_TIMEOUT_MS
    }

    fn default_shutdown_timeout_ms() -> u64 {
        DEFAULT_SHUTDOWN_TIMEOUT_MS
    }

    fn default_throttle_delay_ms() -> u64 {
        DEFAULT_THROTTLE_DELAY_MS
    }

    fn default_batch_pause_ms() -> u64 {
        DEFAULT_BATCH_PAUSE_MS
    }

    fn default_max_dimension() -> u32 {
        DEFAULT_MAX_DIMENSION
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            max_memory_mb: Self::default_max_memory_mb(),
            batch_size: Self::default_batch_size(),
            max_queue_size: Self::default_max_queue_size(),
            gc_interval_ms: Self::default_gc_interval_ms(),
            task_timeout_ms: Self::default_task_timeout_ms(),
            init_timeout_ms: Self::default_init_timeout_ms(),
            shutdown_timeout_ms: Self::default_shutdown_timeout_ms(),
            throttle_delay_ms: Self::default_throttle_delay_ms(),
            batch_pause_ms: Self::default_batch_pause_ms(),
            max_dimension: Self::default_max_dimension(),
            admission: AdmissionPolicy::default(),
        }
    }
}

impl ConfigValidator for PoolConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(count) = self.worker_count {
            self.validate_thread_count(count)?;
        }
        self.validate_memory_limit(self.max_memory_mb)?;
        self.validate_positive_usize(self.batch_size, "batch_size")?;
        self.validate_positive_usize(self.max_queue_size, "max_queue_size")?;
        self.validate_positive_u64(self.gc_interval_ms, "gc_interval_ms")?;
        self.validate_positive_u64(self.task_timeout_ms, "task_timeout_ms")?;
        self.validate_positive_u64(self.init_timeout_ms, "init_timeout_ms")?;
        self.validate_positive_u64(self.shutdown_timeout_ms, "shutdown_timeout_ms")?;
        if self.max_dimension == 0 {
            return Err(ConfigError::ZeroValue {
                field: "max_dimension",
            });
        }
        if self.batch_size > self.max_queue_size {
            return Err(ConfigError::InvalidConfig {
                message: format!(
                    "batch_size {} exceeds max_queue_size {}",
                    self.batch_size, self.max_queue_size
                ),
            });
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = PoolConfig::default();
        assert_eq!(config.max_memory_mb, 512);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_queue_size, 100);
        assert_eq!(config.gc_interval_ms, 30_000);
        assert_eq!(config.task_timeout_ms, 30_000);
        assert_eq!(config.max_dimension, 1920);
        assert_eq!(config.admission, AdmissionPolicy::SoftThrottle);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_worker_count_is_capped() {
        let count = PoolConfig::default_worker_count();
        assert!((1..=MAX_DEFAULT_WORKERS).contains(&count));
    }

    #[test]
    fn resolve_worker_count_prefers_explicit_request() {
        let config = PoolConfig::new().with_worker_count(Some(3));
        assert_eq!(config.resolve_worker_count(Some(2)), 2);
        assert_eq!(config.resolve_worker_count(None), 3);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config =
            PoolConfig::from_json_str(r#"{ "worker_count": 2, "admission": "HardLimit" }"#)
                .unwrap();
        assert_eq!(config.worker_count, Some(2));
        assert_eq!(config.admission, AdmissionPolicy::HardLimit);
        assert_eq!(config.batch_size, 10);
    }

    #[test]
    fn batch_larger_than_queue_is_rejected() {
        let config = PoolConfig::new().with_batch_size(20).with_max_queue_size(10);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn zero_values_are_rejected() {
        assert!(PoolConfig::new().with_batch_size(0).validate().is_err());
        assert!(PoolConfig::new().with_gc_interval_ms(0).validate().is_err());
        assert!(PoolConfig::new().with_max_dimension(0).validate().is_err());
        assert!(
            PoolConfig::new()
                .with_worker_count(Some(0))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            PoolConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "batch_size": 2, "max_queue_size": 8 }}"#).unwrap();

        let config = PoolConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.max_queue_size, 8);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = PoolConfig::from_json_file("/nonexistent/pool.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
