//! Worker thread implementation.
//!
//! Worker threads continuously pull slice tasks from the queues and execute
//! them against a reusable per-worker scratch buffer. Each worker owns a
//! local deque, steals from the global injector and from other workers when
//! idle, and can be pinned to a CPU core for cache locality.

use crate::PinningStrategy;
use crate::task::{ScratchBuffer, Task};
use crossbeam::deque::{Injector, Steal, Stealer, Worker as Deque};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

#[cfg(feature = "metrics")]
type MetricsHandle = Arc<crate::metrics::Metrics>;
#[cfg(not(feature = "metrics"))]
type MetricsHandle = ();

/// A worker thread that executes slice tasks from a queue.
pub(crate) struct Worker {
    id: usize,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Creates and starts a new worker thread with work-stealing support.
    fn spawn(
        id: usize,
        local_queue: Deque<Task>,
        stealers: Arc<Vec<Stealer<Task>>>,
        injector: Arc<Injector<Task>>,
        shutdown: Arc<AtomicBool>,
        core: Option<core_affinity::CoreId>,
        metrics: MetricsHandle,
    ) -> io::Result<Self> {
        let handle = thread::Builder::new()
            .name(format!("slicejobs-worker-{id}"))
            .spawn(move || {
                if let Some(core) = core {
                    if !core_affinity::set_for_current(core) {
                        log::warn!("worker {id}: failed to pin to core {:?}", core.id);
                    }
                }

                Worker::run_loop(id, local_queue, stealers, injector, shutdown, metrics);
            })?;

        Ok(Worker {
            id,
            handle: Some(handle),
        })
    }

    /// Main execution loop for the worker thread with work-stealing.
    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn run_loop(
        id: usize,
        local_queue: Deque<Task>,
        stealers: Arc<Vec<Stealer<Task>>>,
        injector: Arc<Injector<Task>>,
        shutdown: Arc<AtomicBool>,
        metrics: MetricsHandle,
    ) {
        let mut scratch = ScratchBuffer::new();

        #[cfg(feature = "trace")]
        let _collector = crate::profile::CollectorGuard;

        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            // Local queue first, then the global injector, then other workers.
            let mut task = local_queue.pop();
            if task.is_none() {
                task = loop {
                    match injector.steal_batch_and_pop(&local_queue) {
                        Steal::Success(t) => break Some(t),
                        Steal::Empty => break None,
                        Steal::Retry => continue,
                    }
                };
            }
            if task.is_none() {
                task = stealers
                    .iter()
                    .map(|s| s.steal())
                    .find_map(|steal_result| match steal_result {
                        Steal::Success(t) => Some(t),
                        _ => None,
                    });
                #[cfg(feature = "metrics")]
                if task.is_some() {
                    metrics.worker_steals.fetch_add(1, Ordering::Relaxed);
                }
            }

            match task {
                Some(task) => {
                    let label = task.label();
                    log::trace!("worker {id} running slice task '{label}'");

                    #[cfg(feature = "trace")]
                    let _span = crate::profile::TraceScope::begin(label, id);

                    task.execute(&mut scratch);

                    #[cfg(feature = "metrics")]
                    metrics.slices_executed.fetch_add(1, Ordering::Relaxed);
                }
                None => {
                    // No work available, yield to prevent busy-waiting.
                    thread::yield_now();
                }
            }
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Waits for the worker thread to finish.
    pub fn join(mut self) -> thread::Result<()> {
        if let Some(handle) = self.handle.take() {
            handle.join()
        } else {
            Ok(())
        }
    }
}

/// A pool of worker threads with work-stealing support.
pub(crate) struct WorkerPool {
    workers: Mutex<Vec<Worker>>,
    injector: Arc<Injector<Task>>,
    shutdown: Arc<AtomicBool>,
    size: usize,
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    metrics: MetricsHandle,
}

impl WorkerPool {
    /// Creates a new worker pool with work-stealing queues, pinning workers
    /// per `pinning`.
    pub fn new(num_threads: usize, pinning: PinningStrategy) -> io::Result<Self> {
        assert!(num_threads > 0, "worker pool needs at least one thread");

        let injector = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let metrics = MetricsHandle::default();
        let mut local_queues = Vec::with_capacity(num_threads);
        let mut stealers = Vec::with_capacity(num_threads);

        for _ in 0..num_threads {
            let deque = Deque::new_fifo();
            stealers.push(deque.stealer());
            local_queues.push(deque);
        }

        let cores = match pinning {
            PinningStrategy::None => Vec::new(),
            _ => core_affinity::get_core_ids().unwrap_or_default(),
        };
        let core_for = |id: usize| -> Option<core_affinity::CoreId> {
            match pinning {
                PinningStrategy::None => None,
                PinningStrategy::Linear => cores.get(id).copied(),
                // Even-numbered logical processors sit on distinct physical
                // cores on SMT-2 systems.
                PinningStrategy::AvoidSmt => cores.get(id * 2).or_else(|| cores.get(id)).copied(),
            }
        };

        let stealers = Arc::new(stealers);
        let mut workers = Vec::with_capacity(num_threads);

        for (id, local_queue) in local_queues.into_iter().enumerate() {
            let spawned = Worker::spawn(
                id,
                local_queue,
                Arc::clone(&stealers),
                Arc::clone(&injector),
                Arc::clone(&shutdown),
                core_for(id),
                metrics.clone(),
            );
            match spawned {
                Ok(worker) => workers.push(worker),
                Err(err) => {
                    // Unwind the partially built pool before reporting.
                    shutdown.store(true, Ordering::Relaxed);
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(err);
                }
            }
        }

        Ok(WorkerPool {
            workers: Mutex::new(workers),
            injector,
            shutdown,
            size: num_threads,
            metrics,
        })
    }

    /// Submits a single task to the global injector.
    pub fn submit(&self, task: Task) {
        #[cfg(feature = "metrics")]
        self.metrics.injector_pushes.fetch_add(1, Ordering::Relaxed);
        self.injector.push(task);
    }

    /// Submits multiple tasks in a batch.
    pub fn submit_batch(&self, tasks: Vec<Task>) {
        #[cfg(feature = "metrics")]
        self.metrics
            .injector_pushes
            .fetch_add(tasks.len() as u64, Ordering::Relaxed);
        for task in tasks {
            self.injector.push(task);
        }
    }

    /// Returns the number of worker threads in the pool.
    pub fn size(&self) -> usize {
        self.size
    }

    #[cfg(feature = "metrics")]
    pub fn metrics(&self) -> &crate::metrics::Metrics {
        &self.metrics
    }

    /// Shuts down the worker pool and waits for all threads to finish.
    ///
    /// All ports must have observed completion of their work before this is
    /// called; the pool only drains what is still sitting in the injector.
    /// Returns the number of workers that panicked, as the error.
    pub fn shutdown(&self) -> Result<(), usize> {
        while !self.injector.is_empty() {
            thread::sleep(std::time::Duration::from_millis(1));
        }

        self.shutdown.store(true, Ordering::Relaxed);

        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        let mut failed_count = 0;
        for worker in workers {
            let worker_id = worker.id();
            if worker.join().is_err() {
                failed_count += 1;
                log::error!("worker {worker_id} panicked during execution");
            }
        }

        if failed_count > 0 {
            Err(failed_count)
        } else {
            Ok(())
        }
    }
}
