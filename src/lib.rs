//! Decoder for CIP greyscale particle-image files.
//!
//! An acquisition session is stored as an index file (`Imageindex*`) holding
//! the timestamps of acquisition events and an image file (`Imagefile*`)
//! holding one compressed greyscale block per event. This crate decodes both,
//! reconstructs greyscale rasters from the particle-image records of an
//! event, and segments them into individual particles.

pub mod config;
pub mod error;
pub mod folder;
pub mod image_file;
pub mod index_file;
pub mod parser;
pub mod processing;
#[cfg(feature = "python")]
pub mod python;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;
pub mod utils;

pub use config::{ExtractionConfig, ExtractionMode, Pairing};
pub use error::{CipError, Result};
pub use folder::{ExtractionReport, FilePair, FileReport, ImageFolder};
pub use image_file::ImageFile;
pub use index_file::IndexFile;
pub use processing::{Connectivity, SegmentationConfig};
pub use types::{BoundingBox, Particle, ParticleImageRecord, Raster, Timestamp};
pub use utils::{ImageSink, PngDirectory};
