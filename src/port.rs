//! Per-consumer submission channel.
//!
//! A [`JobPort`] accepts jobs and flush barriers from one producer and joins
//! on their completion. Jobs pushed between two flushes form a group; a group
//! is handed to the backend only once every slice of all earlier groups has
//! finished, which is the whole of the barrier guarantee. The producer never
//! blocks on a push - [`JobPort::wait_done`] and [`JobPort::check_done`] are
//! the only blocking/polling operations.

use crate::counter::Counter;
use crate::job::{Job, run_slice};
use crate::system::Backend;
use crate::task::Task;
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

/// Upper bound on groups parked behind barriers on one port.
pub(crate) const MAX_PENDING_GROUPS: usize = 32;

struct PortInner {
    /// Slices handed to the backend and not yet finished.
    active: usize,
    /// Task groups parked behind a barrier, front first.
    deferred: VecDeque<Vec<Task>>,
    /// Set by a flush: the next push starts a new group.
    sealed: bool,
}

struct PortShared {
    backend: Arc<dyn Backend>,
    /// Counts every slice pushed and not yet finished, parked or not.
    outstanding: Counter,
    inner: Mutex<PortInner>,
}

impl PortShared {
    /// Called by each slice task as it finishes; releases the next group when
    /// the active one drains.
    fn slice_finished(&self) {
        let promoted = {
            let mut inner = self.inner.lock().unwrap();
            inner.active -= 1;
            if inner.active == 0 {
                if let Some(group) = inner.deferred.pop_front() {
                    inner.active = group.len();
                    Some(group)
                } else {
                    None
                }
            } else {
                None
            }
        };
        // Submit outside the lock; a serial backend runs tasks inline.
        if let Some(group) = promoted {
            self.backend.submit_batch(group);
        }
    }
}

/// An execution channel bound to the shared worker pool.
///
/// States: idle (nothing outstanding) -> filled (>= 1 job or flush queued or
/// running) -> idle again after [`JobPort::wait_done`]. Each consumer owns
/// its port exclusively; there is no ordering relationship between jobs on
/// different ports.
pub struct JobPort {
    shared: Arc<PortShared>,
}

impl JobPort {
    pub(crate) fn new(backend: Arc<dyn Backend>) -> Self {
        JobPort {
            shared: Arc::new(PortShared {
                backend,
                outstanding: Counter::new(0),
                inner: Mutex::new(PortInner {
                    active: 0,
                    deferred: VecDeque::new(),
                    sealed: false,
                }),
            }),
        }
    }

    /// Enqueues the job's slices. Slices may start before this returns and
    /// may finish in any order; all of them execute against the binding
    /// snapshot taken at `Job::setup`.
    pub fn push_job(&self, job: &Job) {
        let binding = job.binding();
        let label = binding.func.name();
        let slice_count = binding.slice_count;
        let flight = job.flight_handle();

        flight.fetch_add(slice_count, Ordering::SeqCst);
        self.shared.outstanding.add(slice_count);

        let tasks: Vec<Task> = (0..slice_count)
            .map(|index| {
                let binding = binding.clone();
                let flight = flight.clone();
                let shared = self.shared.clone();
                Task::with_counter(
                    move |scratch| {
                        run_slice(&binding, index, scratch);
                        flight.fetch_sub(1, Ordering::SeqCst);
                        shared.slice_finished();
                    },
                    self.shared.outstanding.clone(),
                )
                .labeled(label)
            })
            .collect();

        let submit_now = {
            let mut inner = self.shared.inner.lock().unwrap();
            if inner.active == 0 && inner.deferred.is_empty() {
                // Nothing ahead of us; any pending barrier is already satisfied.
                inner.sealed = false;
                inner.active = slice_count;
                Some(tasks)
            } else if inner.sealed {
                assert!(
                    inner.deferred.len() < MAX_PENDING_GROUPS,
                    "job port overflow: more than {MAX_PENDING_GROUPS} groups parked behind barriers"
                );
                inner.deferred.push_back(tasks);
                inner.sealed = false;
                None
            } else if let Some(tail) = inner.deferred.back_mut() {
                tail.extend(tasks);
                None
            } else {
                inner.active += slice_count;
                Some(tasks)
            }
        };
        if let Some(tasks) = submit_now {
            self.shared.backend.submit_batch(tasks);
        }
    }

    /// Inserts a barrier: nothing queued after it starts before everything
    /// queued before it has finished. A flush on an idle port is a no-op.
    pub fn push_flush(&self) {
        let mut inner = self.shared.inner.lock().unwrap();
        if inner.active > 0 || !inner.deferred.is_empty() {
            inner.sealed = true;
        }
    }

    /// Non-blocking poll; true when nothing is outstanding.
    pub fn check_done(&self) -> bool {
        self.shared.outstanding.is_complete()
    }

    /// Blocks until all previously pushed jobs and flushes have completed.
    /// Calling it again with no intervening push returns immediately.
    pub fn wait_done(&self) {
        self.shared.outstanding.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::JobFuncContext;
    use crate::descriptor::{InputDescriptor, OutputDescriptor, UniformDescriptor};
    use crate::function::JobFunction;
    use crate::system::SerialBackend;

    struct AddOne;

    impl JobFunction for AddOne {
        fn execute(&self, ctx: &mut JobFuncContext<'_>) {
            let src = ctx.input_items::<f32>(0);
            let dst = ctx.take_output::<f32>(0);
            for (d, s) in dst.iter_mut().zip(src) {
                *d = s + 1.0;
            }
        }
    }

    fn serial_port() -> JobPort {
        JobPort::new(Arc::new(SerialBackend::new()))
    }

    #[test]
    fn test_push_and_wait() {
        let port = serial_port();
        let input = [1.0f32, 2.0, 3.0, 4.0];
        let mut output = [0.0f32; 4];

        let mut in_desc = InputDescriptor::new();
        in_desc.add_buffer(&input, 2);
        let mut out_desc = OutputDescriptor::new();
        out_desc.add_buffer(&mut output, 2);

        let mut job = Job::new();
        job.setup(UniformDescriptor::new(), in_desc, out_desc, Arc::new(AddOne));

        port.push_flush();
        port.push_job(&job);
        port.wait_done();
        assert!(check_idle(&port, &job));
        job.discard();

        assert_eq!(output, [2.0, 3.0, 4.0, 5.0]);
    }

    fn check_idle(port: &JobPort, job: &Job) -> bool {
        port.check_done() && job.in_flight() == 0
    }

    #[test]
    fn test_wait_done_is_idempotent() {
        let port = serial_port();
        assert!(port.check_done());
        port.wait_done();
        port.wait_done();
        assert!(port.check_done());
    }

    #[test]
    fn test_flush_on_idle_port_is_noop() {
        let port = serial_port();
        port.push_flush();
        port.push_flush();
        assert!(port.check_done());
        port.wait_done();
    }
}
