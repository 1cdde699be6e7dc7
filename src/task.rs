//! Pool-level work units.
//!
//! A [`Task`] is one slice of one job, lowered to a closure the worker pool
//! can run anywhere. Tasks carry the counter that tracks their port's
//! outstanding work and a label for diagnostics.

use crate::counter::Counter;

/// Reusable per-worker scratch storage.
///
/// Backed by `u64` words so byte views handed to job functions are aligned
/// for any [`crate::PlainData`] record. Grows to the largest scratch size
/// seen and is reused across slices; contents are not cleared between tasks.
pub(crate) struct ScratchBuffer {
    words: Vec<u64>,
}

impl ScratchBuffer {
    pub fn new() -> Self {
        ScratchBuffer { words: Vec::new() }
    }

    /// A mutable byte view of at least `len` bytes.
    pub fn bytes_mut(&mut self, len: usize) -> &mut [u8] {
        let needed = len.div_ceil(8);
        if self.words.len() < needed {
            self.words.resize(needed, 0);
        }
        // SAFETY: the word buffer spans at least `len` bytes and u64 storage
        // satisfies any supported record alignment.
        unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr() as *mut u8, len) }
    }
}

impl Default for ScratchBuffer {
    fn default() -> Self {
        ScratchBuffer::new()
    }
}

/// A unit of work to be executed by the worker pool.
pub(crate) struct Task {
    work: Box<dyn FnOnce(&mut ScratchBuffer) + Send + 'static>,
    counter: Option<Counter>,
    label: &'static str,
}

impl Task {
    /// Creates a new task with the given work function.
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce(&mut ScratchBuffer) + Send + 'static,
    {
        Task {
            work: Box::new(work),
            counter: None,
            label: "task",
        }
    }

    /// Creates a new task that decrements `counter` upon completion.
    pub fn with_counter<F>(work: F, counter: Counter) -> Self
    where
        F: FnOnce(&mut ScratchBuffer) + Send + 'static,
    {
        Task {
            work: Box::new(work),
            counter: Some(counter),
            label: "task",
        }
    }

    pub fn labeled(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Executes the task and decrements its counter if present.
    pub fn execute(self, scratch: &mut ScratchBuffer) {
        (self.work)(scratch);

        if let Some(counter) = self.counter {
            counter.decrement();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_task_execution() {
        let executed = Arc::new(AtomicBool::new(false));
        let executed_clone = executed.clone();

        let task = Task::new(move |_| {
            executed_clone.store(true, Ordering::SeqCst);
        });

        task.execute(&mut ScratchBuffer::new());
        assert!(executed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_task_with_counter() {
        let counter = Counter::new(1);
        let counter_clone = counter.clone();

        let task = Task::with_counter(move |_| {}, counter_clone);

        assert_eq!(counter.value(), 1);
        task.execute(&mut ScratchBuffer::new());
        assert_eq!(counter.value(), 0);
    }

    #[test]
    fn test_scratch_grows_and_is_aligned() {
        let mut scratch = ScratchBuffer::new();
        let view = scratch.bytes_mut(13);
        assert_eq!(view.len(), 13);
        assert_eq!(view.as_ptr() as usize % 8, 0);

        let bigger = scratch.bytes_mut(64);
        assert_eq!(bigger.len(), 64);
    }
}
