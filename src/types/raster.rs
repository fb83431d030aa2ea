//! Greyscale rasters reconstructed from slice codes

use crate::types::particle_image::SLICE_WIDTH;
use ndarray::{Array2, ArrayView2, Axis};
use serde::Serialize;

/// Map a 2-bit greyscale code to an 8-bit intensity: 0 -> 255, 1 -> 170, 2 -> 85, 3 -> 0.
pub fn code_to_intensity(code: u8) -> u8 {
    (255 / 3) * (3 - code.min(3))
}

/// Row-major 8-bit raster, one row per slice, [`SLICE_WIDTH`] columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub data: Array2<u8>,
}

impl Raster {
    /// Map slice codes through the intensity transform.
    pub fn from_codes(codes: ArrayView2<'_, u8>) -> Self {
        Self {
            data: codes.mapv(code_to_intensity),
        }
    }

    /// Stack rasters vertically in order. Returns `None` when there are no rows.
    pub fn concatenate(parts: &[Raster]) -> Option<Self> {
        let views: Vec<_> = parts.iter().map(|r| r.data.view()).collect();
        if views.iter().all(|v| v.nrows() == 0) {
            return None;
        }
        ndarray::concatenate(Axis(0), &views)
            .ok()
            .map(|data| Self { data })
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, u8> {
        self.data.view()
    }
}

/// Axis-aligned bounding box in raster coordinates, end-exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl BoundingBox {
    pub fn height(&self) -> usize {
        self.row_end - self.row_start
    }

    pub fn width(&self) -> usize {
        self.col_end - self.col_start
    }
}

/// One segmented particle: a square raster with the component's bounding-box
/// content centred in it.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub image: Array2<u8>,
    pub bbox: BoundingBox,
}

impl Particle {
    pub fn side(&self) -> usize {
        self.image.nrows()
    }
}

impl Default for Raster {
    fn default() -> Self {
        Self {
            data: Array2::zeros((0, SLICE_WIDTH)),
        }
    }
}
