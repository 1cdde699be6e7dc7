//! Slice-independence and reduction-associativity properties.
//!
//! Running a whole input as one slice must produce byte-identical output to
//! splitting it into N slices, and merging the per-slice reduction records
//! must equal the aggregate of a single sequential pass.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slicejobs::{
    InputDescriptor, Job, JobSystem, JobSystemConfig, OutputDescriptor, Particle,
    ParticleReduction, ParticleStepFunction, ParticleStepUniforms, UniformDescriptor,
    math::Vec3,
};
use std::sync::Arc;

fn seeded_particles(count: usize, seed: u64) -> Vec<Particle> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| Particle {
            position: Vec3::new(
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-50.0..50.0),
            ),
            velocity: Vec3::new(
                rng.gen_range(-5.0..5.0),
                rng.gen_range(-5.0..5.0),
                rng.gen_range(-5.0..5.0),
            ),
            age: rng.gen_range(0.0..2.0),
            lifetime: rng.gen_range(0.5..3.0),
            rotation: 0.0,
            spin: rng.gen_range(-1.0..1.0),
            size: 1.0,
            color: [1.0; 4],
        })
        .collect()
}

fn run_step(
    system: &JobSystem,
    src: &[Particle],
    particles_per_slice: usize,
    delta_time: f32,
) -> (Vec<Particle>, Vec<ParticleReduction>) {
    let slice_count = src.len().div_ceil(particles_per_slice);
    let mut dst = src.to_vec();
    let mut reductions = vec![ParticleReduction::EMPTY; slice_count];

    let uniforms = ParticleStepUniforms {
        delta_time,
        gravity: Vec3::new(0.0, -9.81, 0.0),
        stretch: 1.0,
    };
    let mut uniform = UniformDescriptor::new();
    uniform.add_block(&uniforms);
    let mut input = InputDescriptor::new();
    input.add_buffer(src, particles_per_slice);
    let mut output = OutputDescriptor::new();
    output.add_buffer(&mut dst, particles_per_slice);
    output.set_reduction(&mut reductions);

    let port = system.make_port();
    let mut job = Job::new();
    job.setup(uniform, input, output, Arc::new(ParticleStepFunction));
    port.push_flush();
    port.push_job(&job);
    port.wait_done();
    job.discard();

    (dst, reductions)
}

#[test]
fn single_slice_and_split_runs_are_identical() {
    let system = JobSystem::new(JobSystemConfig {
        worker_threads: Some(4),
        ..JobSystemConfig::default()
    })
    .unwrap();
    let particles = seeded_particles(1000, 11);

    let (whole, _) = run_step(&system, &particles, particles.len(), 0.016);
    for split in [2, 3, 8, 16, 1000] {
        let per_slice = particles.len().div_ceil(split);
        let (parts, _) = run_step(&system, &particles, per_slice, 0.016);
        assert_eq!(parts, whole, "{split}-way split diverged from single slice");
    }

    system.shutdown().unwrap();
}

#[test]
fn merged_reductions_match_single_pass_aggregate() {
    let system = JobSystem::new(JobSystemConfig {
        worker_threads: Some(4),
        ..JobSystemConfig::default()
    })
    .unwrap();
    let particles = seeded_particles(1000, 23);

    let (_, single) = run_step(&system, &particles, particles.len(), 0.05);
    assert_eq!(single.len(), 1);

    let (_, split) = run_step(&system, &particles, 64, 0.05);
    assert_eq!(split.len(), 1000usize.div_ceil(64));

    let mut merged = ParticleReduction::EMPTY;
    for record in &split {
        merged.merge(record);
    }
    assert_eq!(merged, single[0]);

    system.shutdown().unwrap();
}

#[test]
fn serial_backend_matches_thread_pool() {
    let pool = JobSystem::new(JobSystemConfig {
        worker_threads: Some(4),
        ..JobSystemConfig::default()
    })
    .unwrap();
    let serial = JobSystem::serial();
    let particles = seeded_particles(500, 3);

    let (from_pool, pool_reductions) = run_step(&pool, &particles, 32, 0.02);
    let (from_serial, serial_reductions) = run_step(&serial, &particles, 32, 0.02);

    assert_eq!(from_pool, from_serial);
    assert_eq!(pool_reductions, serial_reductions);

    pool.shutdown().unwrap();
    serial.shutdown().unwrap();
}
