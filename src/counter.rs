//! Counter-based synchronization primitive for slice completion tracking.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

struct InnerCounter {
    value: AtomicUsize,
    // Pure wake channel; the value itself stays atomic so polling never locks.
    lock: Mutex<()>,
    on_zero: Condvar,
}

/// A thread-safe counter tracking how many slices are still outstanding.
///
/// Producers poll with [`Counter::is_complete`] or block in [`Counter::wait`];
/// workers call [`Counter::decrement`] once per finished slice.
#[derive(Clone)]
pub struct Counter {
    inner: Arc<InnerCounter>,
}

impl Counter {
    /// Creates a new counter with the specified initial value.
    pub fn new(initial: usize) -> Self {
        Counter {
            inner: Arc::new(InnerCounter {
                value: AtomicUsize::new(initial),
                lock: Mutex::new(()),
                on_zero: Condvar::new(),
            }),
        }
    }

    /// Adds `n` pending completions.
    pub fn add(&self, n: usize) {
        self.inner.value.fetch_add(n, Ordering::SeqCst);
    }

    /// Decrements the counter by one and wakes waiting threads if it reached
    /// zero. Returns true on the transition to zero.
    pub fn decrement(&self) -> bool {
        let old = self.inner.value.fetch_sub(1, Ordering::SeqCst);
        assert!(old > 0, "counter decremented below zero");
        if old == 1 {
            // Waiters check the value under the lock, so taking it here makes
            // the zero store visible before the wakeup.
            let _guard = self.inner.lock.lock().unwrap();
            self.inner.on_zero.notify_all();
            true
        } else {
            false
        }
    }

    /// Returns the current value of the counter.
    pub fn value(&self) -> usize {
        self.inner.value.load(Ordering::SeqCst)
    }

    /// Checks if the counter has reached zero.
    pub fn is_complete(&self) -> bool {
        self.value() == 0
    }

    /// Blocks until the counter reaches zero. Returns immediately when it
    /// already has.
    pub fn wait(&self) {
        if self.is_complete() {
            return;
        }
        let mut guard = self.inner.lock.lock().unwrap();
        while !self.is_complete() {
            guard = self.inner.on_zero.wait(guard).unwrap();
        }
    }
}
