//! High-level job system interface.
//!
//! The [`JobSystem`] owns the shared worker pool for its part of the process
//! and hands out [`JobPort`]s bound to it. It is constructed explicitly by
//! the application's composition root and passed by reference to whatever
//! builds ports - there is no ambient global state. The execution backend is
//! chosen once at construction and fixed for the system's lifetime.

use crate::PinningStrategy;
use crate::port::JobPort;
use crate::task::{ScratchBuffer, Task};
use crate::worker::WorkerPool;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// An execution backend consuming slice tasks on behalf of job ports.
pub(crate) trait Backend: Send + Sync {
    fn submit(&self, task: Task);
    fn submit_batch(&self, tasks: Vec<Task>);
    fn worker_count(&self) -> usize;
    /// Joins the execution units; the error is the number that panicked.
    fn shutdown(&self) -> Result<(), usize>;
    #[cfg(feature = "metrics")]
    fn metrics_snapshot(&self) -> crate::metrics::MetricsSnapshot;
}

/// Single-thread fallback: runs every slice inline on the submitting thread.
pub(crate) struct SerialBackend {
    // Parked between submissions; taken out while a task runs so re-entrant
    // submissions (a barrier group released from inside a task) get a fresh
    // buffer instead of deadlocking.
    scratch: Mutex<Option<ScratchBuffer>>,
}

impl SerialBackend {
    pub fn new() -> Self {
        SerialBackend {
            scratch: Mutex::new(Some(ScratchBuffer::new())),
        }
    }
}

impl Backend for SerialBackend {
    fn submit(&self, task: Task) {
        let parked = self.scratch.lock().unwrap().take();
        let mut scratch = parked.unwrap_or_default();
        task.execute(&mut scratch);
        *self.scratch.lock().unwrap() = Some(scratch);
    }

    fn submit_batch(&self, tasks: Vec<Task>) {
        for task in tasks {
            self.submit(task);
        }
    }

    fn worker_count(&self) -> usize {
        1
    }

    fn shutdown(&self) -> Result<(), usize> {
        Ok(())
    }

    #[cfg(feature = "metrics")]
    fn metrics_snapshot(&self) -> crate::metrics::MetricsSnapshot {
        crate::metrics::MetricsSnapshot::default()
    }
}

impl Backend for WorkerPool {
    fn submit(&self, task: Task) {
        WorkerPool::submit(self, task);
    }

    fn submit_batch(&self, tasks: Vec<Task>) {
        WorkerPool::submit_batch(self, tasks);
    }

    fn worker_count(&self) -> usize {
        self.size()
    }

    fn shutdown(&self) -> Result<(), usize> {
        WorkerPool::shutdown(self)
    }

    #[cfg(feature = "metrics")]
    fn metrics_snapshot(&self) -> crate::metrics::MetricsSnapshot {
        self.metrics().snapshot()
    }
}

/// Which execution backend a [`JobSystem`] drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendKind {
    /// Serial single-thread fallback; slices run inline at submission.
    Serial,
    /// Work-stealing CPU thread pool.
    #[default]
    ThreadPool,
}

/// Configuration for the job system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSystemConfig {
    /// Execution backend to drive.
    pub backend: BackendKind,
    /// Worker thread count; defaults to the number of CPUs.
    pub worker_threads: Option<usize>,
    /// How worker threads are pinned to cores.
    pub pinning: PinningStrategy,
}

/// Errors surfaced while bringing the worker pool up or down. Backend
/// initialization failure is expected to abort application startup.
#[derive(Debug, Error)]
pub enum JobSystemError {
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),
    #[error("{0} worker thread(s) panicked")]
    WorkersPanicked(usize),
}

/// The owner of the shared worker pool.
///
/// Construct one at startup, hand out ports with [`JobSystem::make_port`],
/// and call [`JobSystem::shutdown`] after every port has observed completion
/// of its outstanding work and every job has been discarded.
pub struct JobSystem {
    backend: Arc<dyn Backend>,
    kind: BackendKind,
}

impl JobSystem {
    /// Brings up the configured backend.
    pub fn new(config: JobSystemConfig) -> Result<Self, JobSystemError> {
        let backend: Arc<dyn Backend> = match config.backend {
            BackendKind::Serial => Arc::new(SerialBackend::new()),
            BackendKind::ThreadPool => {
                let threads = config.worker_threads.unwrap_or_else(num_cpus::get).max(1);
                Arc::new(WorkerPool::new(threads, config.pinning)?)
            }
        };
        log::info!(
            "job system online: {:?} backend, {} execution unit(s)",
            config.backend,
            backend.worker_count()
        );
        Ok(JobSystem {
            backend,
            kind: config.backend,
        })
    }

    /// A serial-backend system; handy as a deterministic fallback.
    pub fn serial() -> Self {
        JobSystem {
            backend: Arc::new(SerialBackend::new()),
            kind: BackendKind::Serial,
        }
    }

    /// Creates an execution channel bound to this system's backend.
    pub fn make_port(&self) -> JobPort {
        JobPort::new(self.backend.clone())
    }

    /// Number of parallel execution units.
    pub fn worker_count(&self) -> usize {
        self.backend.worker_count()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    /// Snapshot of the scheduler counters.
    #[cfg(feature = "metrics")]
    pub fn metrics_snapshot(&self) -> crate::metrics::MetricsSnapshot {
        self.backend.metrics_snapshot()
    }

    /// Tears the backend down, joining all workers.
    ///
    /// Valid once every port is idle and every job discarded; queued work is
    /// drained, not cancelled.
    pub fn shutdown(self) -> Result<(), JobSystemError> {
        self.backend
            .shutdown()
            .map_err(JobSystemError::WorkersPanicked)?;
        log::info!("job system offline");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_pool_system_creation() {
        let system = JobSystem::new(JobSystemConfig {
            backend: BackendKind::ThreadPool,
            worker_threads: Some(4),
            pinning: PinningStrategy::None,
        })
        .unwrap();
        assert_eq!(system.worker_count(), 4);
        assert_eq!(system.backend_kind(), BackendKind::ThreadPool);
        system.shutdown().expect("shutdown failed");
    }

    #[test]
    fn test_serial_system() {
        let system = JobSystem::serial();
        assert_eq!(system.worker_count(), 1);
        assert_eq!(system.backend_kind(), BackendKind::Serial);
        system.shutdown().expect("shutdown failed");
    }

    #[test]
    fn test_default_config_uses_all_cpus() {
        let config = JobSystemConfig::default();
        assert_eq!(config.backend, BackendKind::ThreadPool);
        assert!(config.worker_threads.is_none());
    }

    #[test]
    fn test_backend_kind_default() {
        assert_eq!(BackendKind::default(), BackendKind::ThreadPool);
        assert_eq!(PinningStrategy::default(), PinningStrategy::None);
    }
}
