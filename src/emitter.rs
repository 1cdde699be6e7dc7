//! Particle system instance: the producer-side integration pattern.
//!
//! Each step: (1) if a prior job is outstanding, join it and merge every
//! slice's reduction record into the instance aggregate; (2) rebuild the
//! step uniform block; (3) rebuild the input/output descriptors directly
//! over the instance's particle storage; (4) flush then push on the
//! instance's private port - never blocking. The join is deferred to the
//! next step's (1), giving one step of pipeline overlap between the
//! producer and the worker pool.
//!
//! Particle storage is double-buffered: the job reads the front buffer and
//! writes the back buffer, and the two are swapped when the step is
//! harvested. Output buffers never alias input buffers.

use crate::descriptor::{InputDescriptor, OutputDescriptor, UniformDescriptor};
use crate::funcs::particle::{Particle, ParticleReduction, ParticleStepFunction, ParticleStepUniforms};
use crate::function::JobFunction;
use crate::job::Job;
use crate::math::{Aabb, Vec3};
use crate::port::JobPort;
use crate::system::JobSystem;
use std::sync::Arc;

/// A particle simulation instance bound to its own [`JobPort`].
pub struct ParticleEmitter {
    front: Vec<Particle>,
    back: Vec<Particle>,
    reductions: Vec<ParticleReduction>,
    particles_per_slice: usize,
    position: Vec3,
    gravity: Vec3,
    stretch: f32,
    bounds: Aabb,
    live: u32,
    job: Job,
    port: JobPort,
    func: Arc<dyn JobFunction>,
    in_flight: bool,
}

impl ParticleEmitter {
    /// Takes ownership of the particle storage; `particles_per_slice`
    /// controls how many slices each step splits into.
    pub fn new(
        system: &JobSystem,
        particles: Vec<Particle>,
        particles_per_slice: usize,
        position: Vec3,
        gravity: Vec3,
    ) -> Self {
        assert!(!particles.is_empty(), "emitter has no particles");
        assert!(particles_per_slice > 0, "slice must hold at least one particle");

        let slice_count = particles.len().div_ceil(particles_per_slice);
        let back = particles.clone();
        ParticleEmitter {
            front: particles,
            back,
            reductions: vec![ParticleReduction::EMPTY; slice_count],
            particles_per_slice,
            position,
            gravity,
            stretch: 1.0,
            bounds: Aabb::from_point(position),
            live: 0,
            job: Job::new(),
            port: system.make_port(),
            func: Arc::new(ParticleStepFunction),
            in_flight: false,
        }
    }

    pub fn set_stretch(&mut self, stretch: f32) {
        self.stretch = stretch;
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Pushes one integration step; never blocks. The previous step, if
    /// still outstanding, is harvested first.
    pub fn step(&mut self, delta_time: f32) {
        self.harvest();

        let uniforms = ParticleStepUniforms {
            delta_time,
            gravity: self.gravity,
            stretch: self.stretch,
        };
        let mut uniform = UniformDescriptor::new();
        uniform.add_block(&uniforms);

        let mut input = InputDescriptor::new();
        input.add_buffer(&self.front, self.particles_per_slice);
        let mut output = OutputDescriptor::new();
        output.add_buffer(&mut self.back, self.particles_per_slice);
        output.set_reduction(&mut self.reductions);

        self.job.setup(uniform, input, output, self.func.clone());
        self.port.push_flush();
        self.port.push_job(&self.job);
        self.in_flight = true;
    }

    /// Joins the outstanding step, if any, and folds its reduction records
    /// into the aggregate bounds and live count.
    pub fn harvest(&mut self) {
        if !self.in_flight {
            return;
        }
        self.port.wait_done();
        self.job.discard();
        self.in_flight = false;

        // The freshly written buffer becomes the new front.
        std::mem::swap(&mut self.front, &mut self.back);

        let mut merged = ParticleReduction::EMPTY;
        for record in &self.reductions {
            merged.merge(record);
        }
        self.live = merged.num_living;
        self.bounds = if merged.num_living == 0 {
            // Nothing alive: collapse to the emitter position.
            Aabb::from_point(self.position)
        } else {
            merged.bounds()
        };
    }

    /// Particle state as of the last harvested step.
    pub fn particles(&self) -> &[Particle] {
        &self.front
    }

    /// Aggregate bounding box as of the last harvested step.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Live particles as of the last harvested step.
    pub fn live_count(&self) -> u32 {
        self.live
    }

    pub fn slice_count(&self) -> usize {
        self.reductions.len()
    }
}

impl Drop for ParticleEmitter {
    fn drop(&mut self) {
        // The binding points into our buffers; join before they go away.
        if self.in_flight {
            self.port.wait_done();
        }
    }
}
