//! Skeletal pose evaluation job function.
//!
//! Joints are stored in topological order: every joint's parent index is
//! strictly less than its own index, so one forward pass composes the full
//! hierarchy without recursion. A slice must cover a whole skeleton's joint
//! range (batching packs several equal-rig instances contiguously, one
//! instance per slice); the per-joint unscaled matrices live in scratch for
//! the duration of the slice.
//!
//! Uniform 0: parent indices (`i32`, negative marks a root). Uniform 1:
//! inverse bind pose matrices. Input 0: [`JointPose`] samples. Input 1:
//! [`JointVariation`] components. Output 0: scaled matrices. Output 1: skin
//! matrices (scaled premultiplied by the inverse bind pose).

use crate::context::JobFuncContext;
use crate::descriptor::PlainData;
use crate::function::JobFunction;
use crate::job::Job;
use crate::math::{Mat34, Quat, Vec3};
use crate::port::JobPort;
use crate::system::JobSystem;
use std::sync::Arc;

/// One joint's local transform sample.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointPose {
    pub rotation: Quat,
    pub translation: Vec3,
    pub scale: Vec3,
}

impl JointPose {
    pub const IDENTITY: JointPose = JointPose {
        rotation: Quat {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        },
        translation: Vec3::ZERO,
        scale: Vec3::ONE,
    };
}

impl Default for JointPose {
    fn default() -> Self {
        JointPose::IDENTITY
    }
}

/// Per-joint blend/variation components applied on top of the pose sample.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointVariation {
    /// Multiplies the joint's scale.
    pub scale: Vec3,
    /// Added to the joint's translation.
    pub translation: Vec3,
}

impl JointVariation {
    pub const NEUTRAL: JointVariation = JointVariation {
        scale: Vec3::ONE,
        translation: Vec3::ZERO,
    };
}

impl Default for JointVariation {
    fn default() -> Self {
        JointVariation::NEUTRAL
    }
}

// SAFETY: repr(C) aggregates of f32 with no padding and no pointers.
unsafe impl PlainData for JointPose {}
unsafe impl PlainData for JointVariation {}

/// Evaluates one skeleton instance per slice.
pub struct SkeletonEvalFunction;

impl JobFunction for SkeletonEvalFunction {
    fn execute(&self, ctx: &mut JobFuncContext<'_>) {
        let parents = ctx.uniform_items::<i32>(0);
        let inv_bind = ctx.uniform_items::<Mat34>(1);
        let poses = ctx.input_items::<JointPose>(0);
        let variations = ctx.input_items::<JointVariation>(1);
        let scaled_out = ctx.take_output::<Mat34>(0);
        let skin_out = ctx.take_output::<Mat34>(1);
        let unscaled = ctx.take_scratch::<Mat34>();

        let joints = poses.len();
        assert_eq!(parents.len(), joints, "parent table does not match the rig");
        assert_eq!(inv_bind.len(), joints, "bind pose table does not match the rig");
        assert_eq!(variations.len(), joints, "variation buffer does not match the rig");
        assert!(
            unscaled.len() >= joints,
            "scratch must hold one matrix per joint"
        );

        for j in 0..joints {
            let pose = &poses[j];
            let variation = &variations[j];

            let local = Mat34::from_rotation_translation(
                pose.rotation,
                pose.translation + variation.translation,
            );
            let parent = parents[j];
            let unscaled_j = if parent < 0 {
                local
            } else {
                let p = parent as usize;
                assert!(p < j, "joint {j} precedes its parent {p}");
                unscaled[p].mul(&local)
            };
            unscaled[j] = unscaled_j;

            // Segment scale stays local: children compose against the
            // unscaled matrix.
            let scaled =
                unscaled_j.mul(&Mat34::from_scale(pose.scale.mul_per_component(variation.scale)));
            scaled_out[j] = scaled;
            skin_out[j] = scaled.mul(&inv_bind[j]);
        }
    }

    fn name(&self) -> &'static str {
        "skeleton_eval"
    }
}

/// A character skeleton bound to its own port: owns the joint buffers, pushes
/// an evaluation job and reads skin matrices back after fetching.
pub struct SkeletonInstance {
    parents: Vec<i32>,
    inv_bind: Vec<Mat34>,
    pose: Vec<JointPose>,
    variation: Vec<JointVariation>,
    scaled: Vec<Mat34>,
    skin: Vec<Mat34>,
    job: Job,
    port: JobPort,
    func: Arc<dyn JobFunction>,
    in_flight: bool,
}

impl SkeletonInstance {
    /// Binds a rig. `parents[i]` must be negative (root) or strictly less
    /// than `i`.
    pub fn new(system: &JobSystem, parents: Vec<i32>, inv_bind: Vec<Mat34>) -> Self {
        assert!(!parents.is_empty(), "rig has no joints");
        assert_eq!(
            parents.len(),
            inv_bind.len(),
            "bind pose table does not match the rig"
        );
        for (joint, &parent) in parents.iter().enumerate() {
            assert!(
                parent < joint as i32,
                "joint {joint} does not follow its parent {parent}"
            );
        }

        let joints = parents.len();
        SkeletonInstance {
            parents,
            inv_bind,
            pose: vec![JointPose::IDENTITY; joints],
            variation: vec![JointVariation::NEUTRAL; joints],
            scaled: vec![Mat34::IDENTITY; joints],
            skin: vec![Mat34::IDENTITY; joints],
            job: Job::new(),
            port: system.make_port(),
            func: Arc::new(SkeletonEvalFunction),
            in_flight: false,
        }
    }

    pub fn joint_count(&self) -> usize {
        self.parents.len()
    }

    /// Local pose samples for the next evaluation. Not available while an
    /// evaluation is in flight.
    pub fn pose_mut(&mut self) -> &mut [JointPose] {
        assert!(!self.in_flight, "fetch the pending evaluation first");
        &mut self.pose
    }

    /// Variation components for the next evaluation.
    pub fn variation_mut(&mut self) -> &mut [JointVariation] {
        assert!(!self.in_flight, "fetch the pending evaluation first");
        &mut self.variation
    }

    /// Pushes an evaluation of the current pose; does not block.
    pub fn evaluate(&mut self) {
        self.fetch();

        let joints = self.parents.len();
        let mut uniform = crate::descriptor::UniformDescriptor::new();
        uniform.add_buffer(&self.parents);
        uniform.add_buffer(&self.inv_bind);
        uniform.set_scratch_size(joints * size_of::<Mat34>());

        let mut input = crate::descriptor::InputDescriptor::new();
        input.add_buffer(&self.pose, joints);
        input.add_buffer(&self.variation, joints);

        let mut output = crate::descriptor::OutputDescriptor::new();
        output.add_buffer(&mut self.scaled, joints);
        output.add_buffer(&mut self.skin, joints);

        self.job.setup(uniform, input, output, self.func.clone());
        self.port.push_flush();
        self.port.push_job(&self.job);
        self.in_flight = true;
    }

    /// Joins the pending evaluation, if any, making the matrices readable.
    pub fn fetch(&mut self) {
        if self.in_flight {
            self.port.wait_done();
            self.job.discard();
            self.in_flight = false;
        }
    }

    /// Scaled joint matrices from the last fetched evaluation.
    pub fn scaled_matrices(&self) -> &[Mat34] {
        assert!(!self.in_flight, "fetch the pending evaluation first");
        &self.scaled
    }

    /// Skin matrices from the last fetched evaluation.
    pub fn skin_matrices(&self) -> &[Mat34] {
        assert!(!self.in_flight, "fetch the pending evaluation first");
        &self.skin
    }
}

impl Drop for SkeletonInstance {
    fn drop(&mut self) {
        // The buffers the binding points into die with us.
        if self.in_flight {
            self.port.wait_done();
        }
    }
}
