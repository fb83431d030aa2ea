pub mod raster;
pub mod segmentation;

// Re-export for easier access
pub use raster::{combine_records, raster_from_record, reconstruct_combined, reconstruct_per_record};
pub use segmentation::{Connectivity, SegmentationConfig, segment};
