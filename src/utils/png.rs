//! Hand-off of rasters to the PNG encoder.
//!
//! Rasters are stored one row per slice. Written images are transposed so
//! that slices run left to right, the direction particles cross the array.

use crate::error::{CipError, Result};
use image::{GrayImage, ImageBuffer, Luma};
use log::info;
use ndarray::{Array2, ArrayView2};
use std::fs;
use std::path::{Path, PathBuf};

/// Convert an ndarray view (`[row, col]`) to a `GrayImage` (`(x = col, y = row)`).
pub fn array_to_gray_image(arr: ArrayView2<'_, u8>) -> GrayImage {
    let (height, width) = arr.dim();
    ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
        Luma([arr[[y as usize, x as usize]]])
    })
}

/// Convert a `GrayImage` back to an ndarray indexed `[row, col]`.
pub fn gray_image_to_array(img: &GrayImage) -> Array2<u8> {
    let (width, height) = img.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
        img.get_pixel(col as u32, row as u32)[0]
    })
}

/// Destination for reconstructed rasters and particles.
pub trait ImageSink: Sync {
    fn write(&self, name: &str, image: ArrayView2<'_, u8>) -> Result<()>;
}

/// Writes images as PNG files into a directory.
#[derive(Debug, Clone)]
pub struct PngDirectory {
    dir: PathBuf,
}

impl PngDirectory {
    /// Use `dir` as output directory, creating it if needed.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| CipError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ImageSink for PngDirectory {
    fn write(&self, name: &str, image: ArrayView2<'_, u8>) -> Result<()> {
        let path = self.dir.join(name);
        array_to_gray_image(image.t())
            .save(&path)
            .map_err(|source| CipError::Image {
                path: path.clone(),
                source,
            })?;
        info!("saved image: {}", name);
        Ok(())
    }
}
