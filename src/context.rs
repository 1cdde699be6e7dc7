//! Per-slice execution context handed to a job function.
//!
//! The context is the only window a [`crate::JobFunction`] has onto memory:
//! read-only views of the job's uniform buffers, read-only views of this
//! slice's input ranges, write views of this slice's output ranges, the
//! slice's reduction record slot, and a scratch region for slice-private
//! temporaries. Output and scratch views are handed out by move (`take_*`)
//! so a function can hold several of them at once without aliasing.

use crate::descriptor::{MAX_REGION_ALIGN, PlainData};

fn cast_items<T: PlainData>(bytes: &[u8]) -> &[T] {
    debug_assert!(align_of::<T>() <= MAX_REGION_ALIGN);
    assert_eq!(bytes.as_ptr() as usize % align_of::<T>(), 0, "misaligned view");
    assert_eq!(bytes.len() % size_of::<T>(), 0, "view is not a whole number of records");
    // SAFETY: alignment and length were checked; the bytes originate from a
    // live value of a PlainData type, so any bit pattern read back is valid.
    unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const T, bytes.len() / size_of::<T>()) }
}

fn cast_items_mut<T: PlainData>(bytes: &mut [u8]) -> &mut [T] {
    debug_assert!(align_of::<T>() <= MAX_REGION_ALIGN);
    assert_eq!(bytes.as_ptr() as usize % align_of::<T>(), 0, "misaligned view");
    assert_eq!(bytes.len() % size_of::<T>(), 0, "view is not a whole number of records");
    // SAFETY: as above; exclusivity is inherited from the &mut borrow.
    unsafe {
        std::slice::from_raw_parts_mut(bytes.as_mut_ptr() as *mut T, bytes.len() / size_of::<T>())
    }
}

/// A read view plus the element size recorded by the descriptor it came from.
struct ByteView<'a> {
    bytes: &'a [u8],
    element_size: usize,
}

/// A write view; `None` once taken by the job function.
struct ByteViewMut<'a> {
    bytes: Option<&'a mut [u8]>,
    element_size: usize,
}

/// The execution context for one slice of one job.
pub struct JobFuncContext<'a> {
    slice_index: usize,
    slice_count: usize,
    uniforms: Vec<&'a [u8]>,
    inputs: Vec<ByteView<'a>>,
    outputs: Vec<ByteViewMut<'a>>,
    reduction: Option<&'a mut [u8]>,
    scratch: Option<&'a mut [u8]>,
}

impl<'a> JobFuncContext<'a> {
    pub(crate) fn new(
        slice_index: usize,
        slice_count: usize,
        uniforms: Vec<&'a [u8]>,
        inputs: Vec<(&'a [u8], usize)>,
        outputs: Vec<(&'a mut [u8], usize)>,
        reduction: Option<&'a mut [u8]>,
        scratch: &'a mut [u8],
    ) -> Self {
        JobFuncContext {
            slice_index,
            slice_count,
            uniforms,
            inputs: inputs
                .into_iter()
                .map(|(bytes, element_size)| ByteView { bytes, element_size })
                .collect(),
            outputs: outputs
                .into_iter()
                .map(|(bytes, element_size)| ByteViewMut {
                    bytes: Some(bytes),
                    element_size,
                })
                .collect(),
            reduction,
            scratch: Some(scratch),
        }
    }

    /// Index of this slice within the job, in `0..slice_count()`.
    pub fn slice_index(&self) -> usize {
        self.slice_index
    }

    /// Total number of slices the job was split into.
    pub fn slice_count(&self) -> usize {
        self.slice_count
    }

    pub fn uniform_count(&self) -> usize {
        self.uniforms.len()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn has_reduction(&self) -> bool {
        self.reduction.is_some()
    }

    /// Uniform buffer `index` as a single block.
    pub fn uniform<T: PlainData>(&self, index: usize) -> &'a T {
        let bytes = self.uniforms[index];
        assert_eq!(bytes.len(), size_of::<T>(), "uniform block size mismatch");
        &cast_items::<T>(bytes)[0]
    }

    /// Uniform buffer `index` as a record array.
    pub fn uniform_items<T: PlainData>(&self, index: usize) -> &'a [T] {
        cast_items(self.uniforms[index])
    }

    /// This slice's range of input buffer `index`.
    pub fn input_items<T: PlainData>(&self, index: usize) -> &'a [T] {
        let view = &self.inputs[index];
        assert_eq!(size_of::<T>(), view.element_size, "input record type mismatch");
        cast_items(view.bytes)
    }

    /// Takes this slice's range of output buffer `index`. Each output can be
    /// taken once per slice invocation.
    pub fn take_output<T: PlainData>(&mut self, index: usize) -> &'a mut [T] {
        let view = &mut self.outputs[index];
        assert_eq!(size_of::<T>(), view.element_size, "output record type mismatch");
        let bytes = view
            .bytes
            .take()
            .unwrap_or_else(|| panic!("output buffer {index} already taken"));
        cast_items_mut(bytes)
    }

    /// Takes this slice's reduction record slot.
    pub fn take_reduction<R: PlainData>(&mut self) -> &'a mut R {
        let bytes = self
            .reduction
            .take()
            .expect("job has no reduction region (or it was already taken)");
        assert_eq!(bytes.len(), size_of::<R>(), "reduction record size mismatch");
        &mut cast_items_mut::<R>(bytes)[0]
    }

    /// Takes the scratch region as a record array; the length is however many
    /// whole records fit the configured scratch size.
    pub fn take_scratch<T: PlainData>(&mut self) -> &'a mut [T] {
        let bytes = self.scratch.take().expect("scratch already taken");
        let whole = bytes.len() - bytes.len() % size_of::<T>();
        cast_items_mut(&mut bytes[..whole])
    }
}
