//! # SliceJobs - Data-Parallel Slice Job System
//!
//! A fork/join job scheduling subsystem for real-time simulation pipelines.
//! Bulk per-frame numeric work (skeletal animation evaluation, particle
//! simulation) is partitioned into fixed-size slices of one job's data and
//! executed across a pool of worker threads, with per-slice reduction records
//! combined by the producer after completion.
//!
//! ## Architecture
//!
//! The model is strictly: one stateless function applied independently to
//! fixed-size slices of one job's buffers. Key components include:
//!
//! - **Descriptors**: typed views describing how uniform, input and output
//!   memory is partitioned into slices
//! - **Job**: binds one [`JobFunction`] with its descriptors for a submission
//! - **JobPort**: a per-consumer submission channel with a flush-barrier
//!   protocol and blocking/polling join
//! - **JobSystem**: owner of the shared worker pool, with a swappable
//!   execution backend (serial fallback or work-stealing thread pool)
//!
//! ## Example
//!
//! ```no_run
//! use slicejobs::{JobSystem, JobSystemConfig};
//!
//! let system = JobSystem::new(JobSystemConfig::default()).expect("backend setup");
//! let port = system.make_port();
//!
//! // job.setup(...); port.push_flush(); port.push_job(&job); port.wait_done();
//!
//! drop(port);
//! system.shutdown().expect("clean shutdown");
//! ```

pub mod context;
pub mod counter;
pub mod descriptor;
pub mod emitter;
pub mod function;
pub mod funcs;
pub mod job;
pub mod math;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod port;
#[cfg(feature = "trace")]
pub mod profile;
pub mod system;
mod task;
mod worker;

use serde::{Deserialize, Serialize};

/// Strategy for pinning worker threads to CPU cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PinningStrategy {
    /// No pinning (standard OS scheduling).
    #[default]
    None,
    /// Linear pinning (worker i -> logical processor i).
    Linear,
    /// Pin to physical cores only (even-numbered logical processors), avoiding SMT contention.
    AvoidSmt,
}

pub use context::JobFuncContext;
pub use counter::Counter;
pub use descriptor::{
    InputDescriptor, MAX_INPUT_BUFFERS, MAX_OUTPUT_BUFFERS, MAX_UNIFORM_BUFFERS, OutputDescriptor,
    PlainData, SliceDescriptor, UniformDescriptor,
};
pub use emitter::ParticleEmitter;
pub use function::JobFunction;
pub use funcs::particle::{Particle, ParticleReduction, ParticleStepFunction, ParticleStepUniforms};
pub use funcs::skeleton::{JointPose, JointVariation, SkeletonEvalFunction, SkeletonInstance};
pub use job::Job;
pub use port::JobPort;
pub use system::{BackendKind, JobSystem, JobSystemConfig, JobSystemError};
