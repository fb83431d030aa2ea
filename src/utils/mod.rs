//! Utility functions for file handling and image output

pub mod file_utils;
pub mod naming;
pub mod png;

// Re-export commonly used utility functions for convenience
pub use file_utils::*;
pub use naming::{combined_image_name, particle_image_name};
pub use png::{ImageSink, PngDirectory};
