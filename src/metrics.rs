//! Optional scheduler counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Live counters updated by the worker pool.
#[derive(Debug)]
pub struct Metrics {
    /// Total slice tasks executed.
    pub slices_executed: AtomicU64,
    /// Total pushes to the global injector.
    pub injector_pushes: AtomicU64,
    /// Successful steals from other workers' queues.
    pub worker_steals: AtomicU64,
    /// When metrics collection started.
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            slices_executed: AtomicU64::new(0),
            injector_pushes: AtomicU64::new(0),
            worker_steals: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Returns a snapshot of the current values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            slices_executed: self.slices_executed.load(Ordering::Relaxed),
            injector_pushes: self.injector_pushes.load(Ordering::Relaxed),
            worker_steals: self.worker_steals.load(Ordering::Relaxed),
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}

/// Snapshot of the counters at a point in time.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub slices_executed: u64,
    pub injector_pushes: u64,
    pub worker_steals: u64,
    pub elapsed_seconds: f64,
}

impl MetricsSnapshot {
    /// Slice throughput since collection started.
    pub fn slices_per_second(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.slices_executed as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }
}
