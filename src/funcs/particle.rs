//! Particle integration job function.
//!
//! One step of a particle simulation: integrate age, velocity, position and
//! rotation by the elapsed step time, and emit one reduction record per slice
//! holding the slice-local bounding box and live count. Particles whose
//! relative age reaches 1 are dead: they are excluded from the live count and
//! do not extend the bounding box, but their records stay in the buffer.

use crate::context::JobFuncContext;
use crate::descriptor::PlainData;
use crate::function::JobFunction;
use crate::math::{Aabb, Vec3};

/// One particle record.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Seconds lived so far.
    pub age: f32,
    /// Total lifetime in seconds; relative age is `age / lifetime`.
    pub lifetime: f32,
    /// Orientation angle in radians.
    pub rotation: f32,
    /// Angular velocity in radians per second.
    pub spin: f32,
    pub size: f32,
    pub color: [f32; 4],
}

impl Particle {
    /// Age normalized to the lifetime; 1.0 and beyond is dead.
    #[inline]
    pub fn relative_age(&self) -> f32 {
        self.age / self.lifetime
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.relative_age() < 1.0
    }
}

/// Per-step integration parameters, shared by every slice as one snapshot.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleStepUniforms {
    /// Elapsed step time in seconds.
    pub delta_time: f32,
    pub gravity: Vec3,
    /// Velocity-stretch factor consumed by the renderer downstream.
    pub stretch: f32,
}

/// Per-slice reduction record: partial bounding box and live count.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleReduction {
    pub bbox_min: Vec3,
    pub bbox_max: Vec3,
    pub num_living: u32,
}

impl ParticleReduction {
    /// The unit of the merge: extending it by any record yields that record.
    pub const EMPTY: ParticleReduction = ParticleReduction {
        bbox_min: Vec3::splat(f32::INFINITY),
        bbox_max: Vec3::splat(f32::NEG_INFINITY),
        num_living: 0,
    };

    /// Associative combine: min/max of the corners, sum of the counts.
    pub fn merge(&mut self, other: &ParticleReduction) {
        self.bbox_min = self.bbox_min.min(other.bbox_min);
        self.bbox_max = self.bbox_max.max(other.bbox_max);
        self.num_living += other.num_living;
    }

    pub fn bounds(&self) -> Aabb {
        Aabb {
            min: self.bbox_min,
            max: self.bbox_max,
        }
    }
}

// SAFETY: repr(C) aggregates of f32/u32 with no padding and no pointers.
unsafe impl PlainData for Particle {}
unsafe impl PlainData for ParticleStepUniforms {}
unsafe impl PlainData for ParticleReduction {}

/// Integrates one slice of particles.
///
/// Uniform 0: [`ParticleStepUniforms`]. Input 0 / output 0: [`Particle`]
/// records (disjoint buffers; consumers ping-pong their storage). Reduction:
/// one [`ParticleReduction`] per slice.
pub struct ParticleStepFunction;

impl JobFunction for ParticleStepFunction {
    fn execute(&self, ctx: &mut JobFuncContext<'_>) {
        let step = ctx.uniform::<ParticleStepUniforms>(0);
        let src = ctx.input_items::<Particle>(0);
        let dst = ctx.take_output::<Particle>(0);
        let reduction = ctx.take_reduction::<ParticleReduction>();

        let mut bounds = Aabb::EMPTY;
        let mut living = 0u32;

        for (out, particle) in dst.iter_mut().zip(src) {
            let mut p = *particle;
            p.age += step.delta_time;
            if p.is_alive() {
                p.velocity += step.gravity * step.delta_time;
                p.position += p.velocity * step.delta_time;
                p.rotation += p.spin * step.delta_time;
                bounds.extend(p.position);
                living += 1;
            }
            *out = p;
        }

        *reduction = ParticleReduction {
            bbox_min: bounds.min,
            bbox_max: bounds.max,
            num_living: living,
        };
    }

    fn name(&self) -> &'static str {
        "particle_step"
    }
}
