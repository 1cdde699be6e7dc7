//! Skeletal evaluation on the worker pool, single rig and batched.

use slicejobs::{
    InputDescriptor, Job, JobSystem, JobSystemConfig, JointPose, JointVariation,
    OutputDescriptor, SkeletonEvalFunction, SkeletonInstance, UniformDescriptor,
    math::{Mat34, Quat, Vec3},
};
use std::sync::Arc;

fn pool_system() -> JobSystem {
    JobSystem::new(JobSystemConfig {
        worker_threads: Some(4),
        ..JobSystemConfig::default()
    })
    .unwrap()
}

/// parents[i] = i - 1: a single chain, topologically ordered.
fn chain_parents(joints: usize) -> Vec<i32> {
    (0..joints).map(|j| j as i32 - 1).collect()
}

#[test]
fn identity_pose_skin_equals_inverse_bind_pose() {
    let system = pool_system();

    let joints = 32;
    let parents = chain_parents(joints);
    let mut inv_bind = vec![Mat34::IDENTITY; joints];
    for (i, m) in inv_bind.iter_mut().enumerate() {
        m.rows[1][3] = -(i as f32); // distinct bind translation per joint
    }

    let mut instance = SkeletonInstance::new(&system, parents, inv_bind.clone());
    instance.evaluate();
    instance.fetch();

    assert_eq!(instance.skin_matrices(), &inv_bind[..]);

    drop(instance);
    system.shutdown().unwrap();
}

#[test]
fn rotated_chain_matches_sequential_reference() {
    let system = pool_system();

    let joints = 8;
    let parents = chain_parents(joints);
    let mut instance = SkeletonInstance::new(&system, parents.clone(), vec![Mat34::IDENTITY; joints]);

    let quarter_turn = Quat::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), std::f32::consts::FRAC_PI_2);
    for pose in instance.pose_mut() {
        pose.rotation = quarter_turn;
        pose.translation = Vec3::new(1.0, 0.0, 0.0);
    }
    instance.evaluate();
    instance.fetch();

    // Sequential reference evaluation of the same chain.
    let mut reference = Vec::with_capacity(joints);
    for j in 0..joints {
        let local = Mat34::from_rotation_translation(quarter_turn, Vec3::new(1.0, 0.0, 0.0));
        let world = if j == 0 {
            local
        } else {
            let prev: &Mat34 = &reference[j - 1];
            prev.mul(&local)
        };
        reference.push(world);
    }

    assert_eq!(instance.scaled_matrices(), &reference[..]);

    drop(instance);
    system.shutdown().unwrap();
}

#[test]
fn batched_instances_evaluate_one_per_slice() {
    let system = pool_system();
    let port = system.make_port();

    // Four instances of the same 16-joint rig, packed contiguously.
    let joints = 16;
    let instances = 4;
    let parents = chain_parents(joints);
    let inv_bind = vec![Mat34::IDENTITY; joints];

    let mut poses = vec![JointPose::IDENTITY; joints * instances];
    for pose in poses.iter_mut() {
        pose.translation = Vec3::new(0.0, 2.0, 0.0);
    }
    let variations = vec![JointVariation::NEUTRAL; joints * instances];
    let mut scaled = vec![Mat34::IDENTITY; joints * instances];
    let mut skin = vec![Mat34::IDENTITY; joints * instances];

    let mut uniform = UniformDescriptor::new();
    uniform.add_buffer(&parents);
    uniform.add_buffer(&inv_bind);
    uniform.set_scratch_size(joints * size_of::<Mat34>());

    let mut input = InputDescriptor::new();
    input.add_buffer(&poses, joints);
    input.add_buffer(&variations, joints);

    let mut output = OutputDescriptor::new();
    output.add_buffer(&mut scaled, joints);
    output.add_buffer(&mut skin, joints);

    let mut job = Job::new();
    job.setup(uniform, input, output, Arc::new(SkeletonEvalFunction));
    assert_eq!(job.slice_count(), instances);

    port.push_flush();
    port.push_job(&job);
    port.wait_done();
    job.discard();

    // Every instance produced the same hierarchy, independently.
    for instance in 1..instances {
        let base = instance * joints;
        assert_eq!(&scaled[base..base + joints], &scaled[..joints]);
    }
    // Chain depth shows up as accumulated translation.
    assert_eq!(scaled[joints - 1].translation(), Vec3::new(0.0, 2.0 * joints as f32, 0.0));

    drop(port);
    system.shutdown().unwrap();
}
