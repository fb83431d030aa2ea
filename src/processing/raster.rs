use crate::image_file::ImageFile;
use crate::types::{ParticleImageRecord, Raster};
use log::debug;

/// Map one record's slices into its own raster.
pub fn raster_from_record(record: &ParticleImageRecord) -> Raster {
    Raster::from_codes(record.slices.view())
}

/// Concatenate the slices of all given records into one raster, in order.
///
/// Returns `None` when the records hold no slices at all.
pub fn combine_records<I>(records: I) -> Option<Raster>
where
    I: IntoIterator<Item = ParticleImageRecord>,
{
    let parts: Vec<Raster> = records
        .into_iter()
        .take_while(|record| record.valid)
        .map(|record| raster_from_record(&record))
        .collect();
    debug!("Combining {} records", parts.len());
    Raster::concatenate(&parts)
}

/// Drain the current event of `image` into a single raster.
pub fn reconstruct_combined(image: &mut ImageFile) -> Option<Raster> {
    combine_records(image.records())
}

/// Rasters of the current event's records, one per record.
pub fn reconstruct_per_record(image: &mut ImageFile) -> impl Iterator<Item = Raster> + '_ {
    image.records().map(|record| raster_from_record(&record))
}
