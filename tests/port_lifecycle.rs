//! Port and system lifecycle edge cases.

use slicejobs::{
    BackendKind, InputDescriptor, Job, JobFuncContext, JobFunction, JobSystem, JobSystemConfig,
    OutputDescriptor, PinningStrategy, UniformDescriptor,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct CopyScaled;

impl JobFunction for CopyScaled {
    fn execute(&self, ctx: &mut JobFuncContext<'_>) {
        let scale = *ctx.uniform::<f32>(0);
        let src = ctx.input_items::<f32>(0);
        let dst = ctx.take_output::<f32>(0);
        thread::sleep(Duration::from_micros(100));
        for (d, s) in dst.iter_mut().zip(src) {
            *d = s * scale;
        }
    }

    fn name(&self) -> &'static str {
        "copy_scaled"
    }
}

fn scaled_job(scale: f32, input: &[f32], output: &mut [f32], per_slice: usize) -> Job {
    let mut uniform = UniformDescriptor::new();
    uniform.add_block(&scale);
    let mut in_desc = InputDescriptor::new();
    in_desc.add_buffer(input, per_slice);
    let mut out_desc = OutputDescriptor::new();
    out_desc.add_buffer(output, per_slice);

    let mut job = Job::new();
    job.setup(uniform, in_desc, out_desc, Arc::new(CopyScaled));
    job
}

fn pool_system(threads: usize) -> JobSystem {
    JobSystem::new(JobSystemConfig {
        backend: BackendKind::ThreadPool,
        worker_threads: Some(threads),
        pinning: PinningStrategy::None,
    })
    .unwrap()
}

#[test]
fn wait_done_twice_returns_immediately() {
    let system = pool_system(2);
    let port = system.make_port();

    let input: Vec<f32> = (0..256).map(|i| i as f32).collect();
    let mut output = vec![0.0f32; 256];
    let mut job = scaled_job(2.0, &input, &mut output, 16);

    port.push_job(&job);
    port.wait_done();
    port.wait_done();
    assert!(port.check_done());
    job.discard();

    assert_eq!(output[255], 510.0);

    drop(port);
    system.shutdown().unwrap();
}

#[test]
fn check_done_eventually_turns_true() {
    let system = pool_system(2);
    let port = system.make_port();

    let input = vec![1.0f32; 512];
    let mut output = vec![0.0f32; 512];
    let mut job = scaled_job(3.0, &input, &mut output, 32);

    assert!(port.check_done(), "fresh port must be idle");
    port.push_job(&job);

    while !port.check_done() {
        thread::yield_now();
    }
    job.discard();
    assert!(output.iter().all(|&v| v == 3.0));

    drop(port);
    system.shutdown().unwrap();
}

#[test]
fn job_is_reusable_after_completion() {
    let system = pool_system(2);
    let port = system.make_port();

    let input = vec![1.0f32; 64];
    let mut first = vec![0.0f32; 64];
    let mut second = vec![0.0f32; 64];

    let mut job = scaled_job(2.0, &input, &mut first, 8);
    port.push_job(&job);
    port.wait_done();
    assert_eq!(job.in_flight(), 0);
    job.discard();

    // Same Job object, fresh binding.
    let mut uniform = UniformDescriptor::new();
    uniform.add_block(&5.0f32);
    let mut in_desc = InputDescriptor::new();
    in_desc.add_buffer(&input, 8);
    let mut out_desc = OutputDescriptor::new();
    out_desc.add_buffer(&mut second, 8);
    job.setup(uniform, in_desc, out_desc, Arc::new(CopyScaled));

    port.push_flush();
    port.push_job(&job);
    port.wait_done();
    job.discard();

    assert!(first.iter().all(|&v| v == 2.0));
    assert!(second.iter().all(|&v| v == 5.0));

    drop(port);
    system.shutdown().unwrap();
}

#[test]
fn ports_are_independent() {
    let system = pool_system(4);
    let port_a = system.make_port();
    let port_b = system.make_port();

    let input = vec![1.0f32; 128];
    let mut out_a = vec![0.0f32; 128];
    let mut out_b = vec![0.0f32; 128];

    let mut job_a = scaled_job(2.0, &input, &mut out_a, 16);
    let mut job_b = scaled_job(4.0, &input, &mut out_b, 16);

    port_a.push_job(&job_a);
    port_b.push_job(&job_b);

    // Waiting on one port says nothing about the other's queue.
    port_a.wait_done();
    assert!(port_a.check_done());
    port_b.wait_done();

    job_a.discard();
    job_b.discard();
    assert!(out_a.iter().all(|&v| v == 2.0));
    assert!(out_b.iter().all(|&v| v == 4.0));

    drop(port_a);
    drop(port_b);
    system.shutdown().unwrap();
}

#[test]
fn serial_backend_runs_everything_inline() {
    let system = JobSystem::serial();
    let port = system.make_port();

    let input = vec![2.0f32; 32];
    let mut output = vec![0.0f32; 32];
    let mut job = scaled_job(0.5, &input, &mut output, 4);

    port.push_flush();
    port.push_job(&job);
    // Inline execution: already complete before any wait.
    assert!(port.check_done());
    port.wait_done();
    job.discard();

    assert!(output.iter().all(|&v| v == 1.0));

    drop(port);
    system.shutdown().unwrap();
}

#[test]
fn pinned_system_still_executes() {
    let system = JobSystem::new(JobSystemConfig {
        backend: BackendKind::ThreadPool,
        worker_threads: Some(2),
        pinning: PinningStrategy::Linear,
    })
    .unwrap();
    let port = system.make_port();

    let input = vec![1.0f32; 64];
    let mut output = vec![0.0f32; 64];
    let mut job = scaled_job(6.0, &input, &mut output, 8);

    port.push_job(&job);
    port.wait_done();
    job.discard();
    assert!(output.iter().all(|&v| v == 6.0));

    drop(port);
    system.shutdown().unwrap();
}
