//! Concrete job functions shipped with the system.

pub mod particle;
pub mod skeleton;
