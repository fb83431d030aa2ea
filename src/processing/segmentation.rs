//! Split a raster into individual particles.
//!
//! The steps are:
//! 1. Threshold the raster (`intensity > 0`)
//! 2. Label connected components with a two-pass union-find
//! 3. Compute each component's bounding box
//! 4. Centre the bounding-box content in a square canvas
//! 5. Drop components smaller than the minimum size and optionally rescale
//!
//! Components are numbered in row-major order of their first pixel and are
//! emitted in that order.

use crate::types::{BoundingBox, Particle, Raster};
use crate::utils::png::{array_to_gray_image, gray_image_to_array};
use bon::Builder;
use image::imageops::{self, FilterType};
use ndarray::{Array2, ArrayView2, s};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pixel neighbourhood used when labeling components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Edge neighbours only.
    #[default]
    Four,
    /// Edge and corner neighbours.
    Eight,
}

/// Configuration for particle segmentation.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Components whose padded side is below this are discarded.
    /// Default: 4
    #[builder(default = 4)]
    pub minimum_size: usize,

    /// Default: 4-connectivity
    #[builder(default)]
    pub connectivity: Connectivity,

    /// Rescale every particle to `output_size × output_size` using
    /// nearest-neighbour sampling.
    /// Default: None (keep the padded size)
    pub output_size: Option<u32>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Label connected components of `mask` using two-pass union-find.
///
/// Returns the label image (0 = background, components numbered from 1) and
/// the number of components.
pub fn label_connected_components(
    mask: ArrayView2<'_, bool>,
    connectivity: Connectivity,
) -> (Array2<u32>, usize) {
    let (h, w) = mask.dim();
    let mut labels = Array2::<u32>::zeros((h, w));
    let mut parent: Vec<u32> = vec![0];
    let mut next_label = 1u32;

    fn find(parent: &mut [u32], mut x: u32) -> u32 {
        while parent[x as usize] != x {
            parent[x as usize] = parent[parent[x as usize] as usize];
            x = parent[x as usize];
        }
        x
    }

    fn union(parent: &mut [u32], a: u32, b: u32) {
        let ra = find(parent, a);
        let rb = find(parent, b);
        // Merge higher into lower to keep labels stable
        if ra < rb {
            parent[rb as usize] = ra;
        } else if rb < ra {
            parent[ra as usize] = rb;
        }
    }

    for row in 0..h {
        for col in 0..w {
            if !mask[[row, col]] {
                continue;
            }

            let mut neighbours = Vec::with_capacity(4);
            if col > 0 {
                neighbours.push(labels[[row, col - 1]]);
            }
            if row > 0 {
                neighbours.push(labels[[row - 1, col]]);
            }
            if connectivity == Connectivity::Eight && row > 0 {
                if col > 0 {
                    neighbours.push(labels[[row - 1, col - 1]]);
                }
                if col + 1 < w {
                    neighbours.push(labels[[row - 1, col + 1]]);
                }
            }
            neighbours.retain(|&l| l > 0);

            match neighbours.iter().min().copied() {
                None => {
                    parent.push(next_label);
                    labels[[row, col]] = next_label;
                    next_label += 1;
                }
                Some(min_label) => {
                    labels[[row, col]] = min_label;
                    for &nl in &neighbours {
                        union(&mut parent, min_label, nl);
                    }
                }
            }
        }
    }

    // Second pass: map roots to sequential labels in order of first encounter
    let mut root_map = HashMap::new();
    let mut seq = 0u32;
    for label in labels.iter_mut() {
        if *label > 0 {
            let root = find(&mut parent, *label);
            *label = *root_map.entry(root).or_insert_with(|| {
                seq += 1;
                seq
            });
        }
    }

    (labels, seq as usize)
}

/// Bounding boxes of labels `1..=count`, indexed by `label - 1`.
pub fn bounding_boxes(labels: ArrayView2<'_, u32>, count: usize) -> Vec<BoundingBox> {
    let mut boxes = vec![
        BoundingBox {
            row_start: usize::MAX,
            row_end: 0,
            col_start: usize::MAX,
            col_end: 0,
        };
        count
    ];
    for ((row, col), &label) in labels.indexed_iter() {
        if label == 0 {
            continue;
        }
        let bbox = &mut boxes[label as usize - 1];
        bbox.row_start = bbox.row_start.min(row);
        bbox.row_end = bbox.row_end.max(row + 1);
        bbox.col_start = bbox.col_start.min(col);
        bbox.col_end = bbox.col_end.max(col + 1);
    }
    boxes
}

/// Copy the bounding-box content of `raster` into a zeroed square canvas of
/// side `max(height, width)`.
///
/// Per axis the content starts at `side / 2 - extent / 2` (integer
/// division), so odd padding puts the extra pixel after the content.
pub fn center_in_square(raster: ArrayView2<'_, u8>, bbox: &BoundingBox) -> Array2<u8> {
    let (h, w) = (bbox.height(), bbox.width());
    let side = h.max(w);
    let center = side / 2;
    let row_offset = center - h / 2;
    let col_offset = center - w / 2;

    let mut canvas = Array2::zeros((side, side));
    canvas
        .slice_mut(s![row_offset..row_offset + h, col_offset..col_offset + w])
        .assign(&raster.slice(s![
            bbox.row_start..bbox.row_end,
            bbox.col_start..bbox.col_end
        ]));
    canvas
}

/// Nearest-neighbour rescale of a square particle image.
pub fn resize_nearest(particle: &Array2<u8>, size: u32) -> Array2<u8> {
    let resized = imageops::resize(
        &array_to_gray_image(particle.view()),
        size,
        size,
        FilterType::Nearest,
    );
    gray_image_to_array(&resized)
}

/// Segment `raster` into particles.
pub fn segment(raster: &Raster, config: &SegmentationConfig) -> Vec<Particle> {
    let mask = raster.data.mapv(|v| v > 0);
    let (labels, count) = label_connected_components(mask.view(), config.connectivity);

    bounding_boxes(labels.view(), count)
        .into_iter()
        .filter(|bbox| bbox.height().max(bbox.width()) >= config.minimum_size)
        .map(|bbox| {
            let mut image = center_in_square(raster.view(), &bbox);
            if let Some(size) = config.output_size {
                image = resize_nearest(&image, size);
            }
            Particle { image, bbox }
        })
        .collect()
}
