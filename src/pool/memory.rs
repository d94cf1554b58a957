//! Memory governor.
//!
//! The governor samples process memory before each task is admitted. Above the
//! configured ceiling it runs a cleanup pass and pauses the submitter for
//! `throttle_delay_ms`; under [`AdmissionPolicy::HardLimit`] it then samples
//! again and refuses the task if usage is still over the ceiling.
//!
//! A cleanup pass asks every live worker to release its session caches. The
//! pool registers itself as the [`CleanupTarget`] when it initializes; the
//! governor only keeps a weak reference, so the pool can be dropped while a
//! ticker still holds the governor.

use crate::core::config::AdmissionPolicy;
use crate::core::constants::BYTES_PER_MB;
use crate::core::traits::MemorySampler;
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

/// Something that can release cached memory on request.
pub trait CleanupTarget: Send + Sync {
    /// Release whatever caches can be rebuilt on demand.
    fn release_caches(&self);
}

/// Admission decision for one task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Usage was under the ceiling.
    Admitted,
    /// No sampler is available; the task is admitted without a check.
    Unmonitored,
    /// Usage was over the ceiling; a cleanup ran and the caller was paused.
    Throttled {
        /// Sampled usage in megabytes.
        usage_mb: u64,
    },
    /// Usage stayed over the ceiling after cleanup under the hard policy.
    Rejected {
        /// Sampled usage in megabytes after the cleanup pass.
        usage_mb: u64,
        /// The configured ceiling.
        limit_mb: u64,
    },
}

impl Admission {
    /// Returns true unless the task was refused.
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Admission::Rejected { .. })
    }
}

/// Samples the resident memory of the current process with `sysinfo`.
pub struct ProcessMemorySampler {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl ProcessMemorySampler {
    /// Creates a sampler for the current process.
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("Cannot determine the current process id: {}", e);
                None
            }
        };
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for ProcessMemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for ProcessMemorySampler {
    fn sample(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).map(|process| process.memory())
    }
}

/// Samples memory, throttles admission, and runs cleanup passes.
pub struct MemoryGovernor {
    sampler: Option<Box<dyn MemorySampler>>,
    limit_mb: u64,
    policy: AdmissionPolicy,
    throttle_delay: Duration,
    target: Mutex<Option<Weak<dyn CleanupTarget>>>,
    last_cleanup: Mutex<Option<SystemTime>>,
    cleanup_count: AtomicU64,
    throttle_count: AtomicU64,
    warned_unmonitored: AtomicBool,
}

impl std::fmt::Debug for MemoryGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGovernor")
            .field("monitored", &self.sampler.is_some())
            .field("limit_mb", &self.limit_mb)
            .field("policy", &self.policy)
            .field("throttle_delay", &self.throttle_delay)
            .finish()
    }
}

impl MemoryGovernor {
    /// Creates a governor with the given ceiling and policy.
    ///
    /// Without a sampler every admission check passes and a warning is logged
    /// once.
    pub fn new(
        sampler: Option<Box<dyn MemorySampler>>,
        limit_mb: u64,
        policy: AdmissionPolicy,
        throttle_delay: Duration,
    ) -> Self {
        Self {
            sampler,
            limit_mb,
            policy,
            throttle_delay,
            target: Mutex::new(None),
            last_cleanup: Mutex::new(None),
            cleanup_count: AtomicU64::new(0),
            throttle_count: AtomicU64::new(0),
            warned_unmonitored: AtomicBool::new(false),
        }
    }

    /// The configured ceiling in megabytes.
    pub fn limit_mb(&self) -> u64 {
        self.limit_mb
    }

    /// Samples current usage in bytes.
    pub fn usage_bytes(&self) -> Option<u64> {
        self.sampler.as_ref().and_then(|sampler| sampler.sample())
    }

    /// Samples current usage in megabytes.
    pub fn usage_mb(&self) -> Option<f64> {
        self.usage_bytes()
            .map(|bytes| bytes as f64 / BYTES_PER_MB as f64)
    }

    /// Decides whether the next task may be admitted, throttling if needed.
    pub fn check_and_throttle(&self) -> Admission {
        if self.sampler.is_none() {
            if !self.warned_unmonitored.swap(true, Ordering::Relaxed) {
                warn!("No memory sampler available; memory throttling is disabled");
            }
            return Admission::Unmonitored;
        }

        let Some(usage) = self.over_limit() else {
            return Admission::Admitted;
        };

        self.throttle_count.fetch_add(1, Ordering::Relaxed);
        warn!(
            "Memory usage {} MB exceeds limit {} MB; running cleanup and pausing {:?}",
            usage, self.limit_mb, self.throttle_delay
        );
        self.force_cleanup();
        thread::sleep(self.throttle_delay);

        match self.policy {
            AdmissionPolicy::SoftThrottle => Admission::Throttled { usage_mb: usage },
            AdmissionPolicy::HardLimit => match self.over_limit() {
                Some(usage_mb) => Admission::Rejected {
                    usage_mb,
                    limit_mb: self.limit_mb,
                },
                None => Admission::Throttled { usage_mb: usage },
            },
        }
    }

    /// Returns usage in whole megabytes when it exceeds the ceiling.
    fn over_limit(&self) -> Option<u64> {
        let usage_mb = self.usage_bytes()? / BYTES_PER_MB;
        (usage_mb > self.limit_mb).then_some(usage_mb)
    }

    /// Runs one cleanup pass and records when it happened.
    pub fn force_cleanup(&self) {
        let target = self.target.lock().as_ref().and_then(Weak::upgrade);
        if let Some(target) = target {
            target.release_caches();
        }
        *self.last_cleanup.lock() = Some(SystemTime::now());
        let count = self.cleanup_count.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Cleanup pass {} complete", count);
    }

    /// Number of cleanup passes run so far.
    pub fn cleanup_count(&self) -> u64 {
        self.cleanup_count.load(Ordering::Relaxed)
    }

    /// Number of admissions that hit the ceiling.
    pub fn throttle_count(&self) -> u64 {
        self.throttle_count.load(Ordering::Relaxed)
    }

    /// When the last cleanup pass ran.
    pub fn last_cleanup(&self) -> Option<SystemTime> {
        *self.last_cleanup.lock()
    }

    /// Registers the target of cleanup passes.
    pub fn attach(&self, target: Weak<dyn CleanupTarget>) {
        *self.target.lock() = Some(target);
    }

    /// Removes the cleanup target.
    pub fn detach(&self) {
        self.target.lock().take();
    }
}

/// Background thread that runs a cleanup pass on a fixed interval.
pub(crate) struct CleanupTicker {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CleanupTicker {
    /// Starts ticking every `interval`.
    pub(crate) fn start(governor: Arc<MemoryGovernor>, interval: Duration) -> std::io::Result<Self> {
        let (stop, stopped) = bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("ocr-pool-cleanup".to_string())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => governor.force_cleanup(),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;
        Ok(Self {
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    /// Stops the ticker and waits for its thread.
    pub(crate) fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("Cleanup ticker thread panicked");
        }
    }
}

impl Drop for CleanupTicker {
    fn drop(&mut self) {
        self.halt();
    }
}
