//! Type definitions for CIP index and image files

pub mod particle_image;
pub mod raster;
pub mod timestamp;

// Re-export the main types for convenience
pub use particle_image::{ParticleImageRecord, SLICE_WIDTH};
pub use raster::{BoundingBox, Particle, Raster};
pub use timestamp::Timestamp;
