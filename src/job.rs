//! Job definition and per-slice lowering.
//!
//! A [`Job`] binds one job function with a uniform, an input and an output
//! descriptor for a submission. Binding validates the bundle once; after that
//! the job can be pushed to a port, which expands it into one task per slice.
//! The job does not own the buffers its descriptors point to - the caller
//! keeps them alive until completion has been observed on the port.

use crate::context::JobFuncContext;
use crate::descriptor::{
    AlignedBytes, InputDescriptor, OutputDescriptor, ReductionDescriptor, SliceDescriptor,
    UniformDescriptor,
};
use crate::function::JobFunction;
use crate::task::ScratchBuffer;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The validated, immutable snapshot a job submission executes against.
/// Every slice task of one push shares one binding.
pub(crate) struct JobBinding {
    pub func: Arc<dyn JobFunction>,
    pub uniforms: Vec<AlignedBytes>,
    pub scratch_size: usize,
    pub inputs: Vec<SliceDescriptor>,
    pub outputs: Vec<SliceDescriptor>,
    pub reduction: Option<ReductionDescriptor>,
    pub slice_count: usize,
}

// SAFETY: the raw input/output pointers reference caller-owned buffers that
// stay alive and unaliased for the job's in-flight window (the setup
// contract), and slice tasks address disjoint byte ranges of them. Uniform
// bytes are owned by the binding itself.
unsafe impl Send for JobBinding {}
unsafe impl Sync for JobBinding {}

/// Executes slice `index` of a binding on the current thread.
pub(crate) fn run_slice(binding: &JobBinding, index: usize, scratch: &mut ScratchBuffer) {
    let scratch_bytes = scratch.bytes_mut(binding.scratch_size);

    let uniforms: Vec<&[u8]> = binding.uniforms.iter().map(AlignedBytes::as_bytes).collect();

    let inputs: Vec<(&[u8], usize)> = binding
        .inputs
        .iter()
        .map(|desc| {
            let (offset, len) = desc.byte_range(index);
            // SAFETY: in range per the slicing math; the buffer outlives the
            // in-flight window per the setup contract.
            let bytes = unsafe { std::slice::from_raw_parts(desc.base().add(offset), len) };
            (bytes, desc.element_size())
        })
        .collect();

    let outputs: Vec<(&mut [u8], usize)> = binding
        .outputs
        .iter()
        .map(|desc| {
            let (offset, len) = desc.byte_range(index);
            // SAFETY: as above; this range is exclusive to slice `index`.
            let bytes = unsafe { std::slice::from_raw_parts_mut(desc.base().add(offset), len) };
            (bytes, desc.element_size())
        })
        .collect();

    let reduction = binding.reduction.map(|r| {
        // SAFETY: capacity >= slice_count was validated at setup, so record
        // `index` is in range and exclusive to this slice.
        unsafe {
            std::slice::from_raw_parts_mut(r.base.add(index * r.element_size), r.element_size)
        }
    });

    let mut ctx = JobFuncContext::new(
        index,
        binding.slice_count,
        uniforms,
        inputs,
        outputs,
        reduction,
        scratch_bytes,
    );
    binding.func.execute(&mut ctx);
}

/// A data-parallel job: one function applied to fixed-size slices of one
/// input/output buffer set.
///
/// Lifecycle: [`Job::setup`] binds the pieces for a submission; the job is in
/// flight from `push_job` until the owning port reports completion;
/// [`Job::discard`] releases the binding, after which the job is reusable for
/// the next `setup`.
pub struct Job {
    binding: Option<Arc<JobBinding>>,
    in_flight: Arc<AtomicUsize>,
}

impl Job {
    pub fn new() -> Self {
        Job {
            binding: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Binds the uniform/input/output descriptors and the function for the
    /// next submission.
    ///
    /// Fatal if the job is already bound, if the input is empty, if input and
    /// output buffers disagree on slice count, or if the reduction region
    /// cannot hold one record per slice.
    pub fn setup(
        &mut self,
        uniform: UniformDescriptor,
        input: InputDescriptor,
        output: OutputDescriptor,
        func: Arc<dyn JobFunction>,
    ) {
        assert!(
            self.binding.is_none(),
            "setup called twice without an intervening discard"
        );

        let inputs = input.buffers().to_vec();
        let outputs = output.buffers().to_vec();
        assert!(!inputs.is_empty(), "job has no input buffers");
        assert!(inputs[0].total_size() > 0, "input descriptor is empty");

        let slice_count = inputs[0].slice_count();
        for desc in inputs.iter().chain(outputs.iter()) {
            assert_eq!(
                desc.slice_count(),
                slice_count,
                "all input/output buffers must split into the same slice count"
            );
        }
        let reduction = output.reduction();
        if let Some(r) = reduction {
            assert!(
                r.capacity() >= slice_count,
                "reduction region holds {} records but the job has {} slices",
                r.capacity(),
                slice_count
            );
        }

        // Output regions must not alias anything else the job touches.
        let out_ranges: Vec<(usize, usize)> = outputs
            .iter()
            .map(|d| (d.base() as usize, d.base() as usize + d.total_size()))
            .collect();
        let mut guarded = out_ranges.clone();
        guarded.extend(
            inputs
                .iter()
                .map(|d| (d.base() as usize, d.base() as usize + d.total_size())),
        );
        if let Some(r) = reduction {
            guarded.push((r.base as usize, r.base as usize + r.total_size));
        }
        for (i, out) in out_ranges.iter().enumerate() {
            for (j, other) in guarded.iter().enumerate() {
                if i == j {
                    continue;
                }
                assert!(
                    out.1 <= other.0 || other.1 <= out.0,
                    "output buffer {i} aliases another job buffer; \
                     bind disjoint storage (ping-pong for in-place updates)"
                );
            }
        }

        self.binding = Some(Arc::new(JobBinding {
            func,
            uniforms: uniform.buffers().to_vec(),
            scratch_size: uniform.scratch_size(),
            inputs,
            outputs,
            reduction,
            slice_count,
        }));
    }

    /// Releases the current binding. Fatal while the job is in flight.
    pub fn discard(&mut self) {
        assert!(self.binding.is_some(), "discard without setup");
        assert_eq!(
            self.in_flight.load(Ordering::SeqCst),
            0,
            "discard while the job is in flight"
        );
        self.binding = None;
    }

    /// True between `setup` and `discard`.
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Number of slices the bound input splits into.
    pub fn slice_count(&self) -> usize {
        self.binding
            .as_ref()
            .expect("job is not set up")
            .slice_count
    }

    /// Slices pushed but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn binding(&self) -> Arc<JobBinding> {
        self.binding.as_ref().expect("job is not set up").clone()
    }

    pub(crate) fn flight_handle(&self) -> Arc<AtomicUsize> {
        self.in_flight.clone()
    }
}

impl Default for Job {
    fn default() -> Self {
        Job::new()
    }
}
