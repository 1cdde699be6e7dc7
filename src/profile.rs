//! Chrome Tracing collector for slice execution visualization.
//!
//! Workers record one span per executed slice into thread-local buffers
//! (zero contention on the hot path); buffers are folded into a global list
//! as workers shut down and can be exported to a JSON file readable by
//! chrome://tracing or ui.perfetto.dev.

use lazy_static::lazy_static;
use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Mutex;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// One executed slice, in Chrome Tracing "complete event" terms.
#[derive(Debug, Clone)]
pub struct SliceSpan {
    pub label: &'static str,
    pub worker: usize,
    pub start_us: u64,
    pub duration_us: u64,
}

thread_local! {
    static SPAN_BUFFER: RefCell<Vec<SliceSpan>> = RefCell::new(Vec::with_capacity(4096));
}

lazy_static! {
    static ref TRACE_START: Instant = Instant::now();
    static ref EPOCH_START_US: u64 = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_micros() as u64;
    static ref COLLECTED: Mutex<Vec<Vec<SliceSpan>>> = Mutex::new(Vec::new());
}

/// RAII span covering one slice execution.
pub struct TraceScope {
    label: &'static str,
    worker: usize,
    start: Instant,
}

impl TraceScope {
    pub fn begin(label: &'static str, worker: usize) -> Self {
        TraceScope {
            label,
            worker,
            start: Instant::now(),
        }
    }
}

impl Drop for TraceScope {
    fn drop(&mut self) {
        let start_us =
            self.start.duration_since(*TRACE_START).as_micros() as u64 + *EPOCH_START_US;
        let duration_us = self.start.elapsed().as_micros() as u64;
        let span = SliceSpan {
            label: self.label,
            worker: self.worker,
            start_us,
            duration_us,
        };
        SPAN_BUFFER.with(|buf| buf.borrow_mut().push(span));
    }
}

/// Folds the current thread's span buffer into the global list. Each worker
/// thread must call this before exiting; [`CollectorGuard`] does it on drop.
pub fn collect_local() {
    SPAN_BUFFER.with(|buf| {
        let mut local = buf.borrow_mut();
        if !local.is_empty() {
            COLLECTED.lock().unwrap().push(std::mem::take(&mut *local));
        }
    });
}

/// RAII guard that collects the local span buffer when dropped.
pub struct CollectorGuard;

impl Drop for CollectorGuard {
    fn drop(&mut self) {
        collect_local();
    }
}

/// Exports all collected spans to a Chrome Tracing JSON file.
pub fn export_to_file(path: &str) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let buffers = COLLECTED.lock().unwrap();

    write!(writer, "[\n")?;
    let mut first = true;
    for buffer in buffers.iter() {
        for span in buffer {
            if !first {
                write!(writer, ",\n")?;
            }
            first = false;

            // ph: X is "Complete Event" (requires dur).
            write!(
                writer,
                "{{\"name\":\"{}\",\"ph\":\"X\",\"ts\":{},\"dur\":{},\"pid\":1,\"tid\":{}}}",
                span.label, span.start_us, span.duration_us, span.worker
            )?;
        }
    }
    write!(writer, "\n]\n")?;
    writer.flush()?;

    Ok(())
}
