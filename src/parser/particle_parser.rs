//! Framing of particle-image records inside a greyscale stream

use crate::parser::greyscale::GreyscaleStream;
use crate::types::particle_image::{ParticleImageRecord, SLICE_WIDTH, header_number};
use log::{debug, trace};
use ndarray::Array2;
use std::ops::RangeInclusive;

/// Consecutive clear codes (two full slices) that separate records.
pub const BOUNDARY_CODES: usize = 128;

/// Bit fields of the 128-bit record header (lsb..=msb).
pub mod fields {
    use super::RangeInclusive;

    pub const AIR_SPEED: RangeInclusive<usize> = 56..=63;
    pub const PARTICLE_COUNT: RangeInclusive<usize> = 64..=79;
    pub const MICROSECONDS: RangeInclusive<usize> = 83..=92;
    pub const MILLISECONDS: RangeInclusive<usize> = 93..=102;
    pub const SECONDS: RangeInclusive<usize> = 103..=108;
    pub const MINUTES: RangeInclusive<usize> = 109..=114;
    pub const HOURS: RangeInclusive<usize> = 115..=119;
    pub const SLICES: RangeInclusive<usize> = 120..=127;
}

fn field(header: &[u8; SLICE_WIDTH], bits: RangeInclusive<usize>) -> u32 {
    header_number(header, *bits.start(), *bits.end())
}

/// Skip past the next record boundary and return the first header code.
///
/// A boundary is at least [`BOUNDARY_CODES`] consecutive `3` codes; any
/// further `3` codes are consumed as well.
fn next_particle_boundary(stream: &mut GreyscaleStream<'_>) -> Option<u8> {
    let mut threes = 0;
    let mut skipped = 0usize;
    while threes < BOUNDARY_CODES {
        let code = stream.next()?;
        skipped += 1;
        if code == 3 {
            threes += 1;
        } else {
            threes = 0;
        }
    }
    loop {
        let code = stream.next()?;
        if code != 3 {
            trace!("Skipped {} codes to next record", skipped);
            return Some(code);
        }
        skipped += 1;
    }
}

fn read_particle_record(stream: &mut GreyscaleStream<'_>) -> Option<ParticleImageRecord> {
    let mut header = [0u8; SLICE_WIDTH];
    header[0] = next_particle_boundary(stream)?;
    for code in header.iter_mut().skip(1) {
        *code = stream.next()?;
    }

    // The declared count includes the header slice itself.
    let declared = field(&header, fields::SLICES) as usize;
    let slice_count = declared.saturating_sub(1);
    debug!("Reading {} slices", slice_count);

    let expected = slice_count * SLICE_WIDTH;
    let codes: Vec<u8> = stream.by_ref().take(expected).collect();
    if codes.len() < expected {
        debug!(
            "Stream ended inside record: {} of {} codes",
            codes.len(),
            expected
        );
        return None;
    }
    let slices = Array2::from_shape_vec((slice_count, SLICE_WIDTH), codes).ok()?;

    Some(
        ParticleImageRecord::builder()
            .air_speed(field(&header, fields::AIR_SPEED))
            .particle_count(field(&header, fields::PARTICLE_COUNT))
            .microseconds(field(&header, fields::MICROSECONDS))
            .milliseconds(field(&header, fields::MILLISECONDS))
            .seconds(field(&header, fields::SECONDS))
            .minutes(field(&header, fields::MINUTES))
            .hours(field(&header, fields::HOURS))
            .slice_count(slice_count)
            .header(header)
            .slices(slices)
            .build(),
    )
}

/// Parses the next particle-image record from the stream.
///
/// Returns the sentinel record (`valid == false`) when the stream ends before
/// a complete record could be read.
pub fn parse_particle_record(stream: &mut GreyscaleStream<'_>) -> ParticleImageRecord {
    read_particle_record(stream).unwrap_or_else(ParticleImageRecord::sentinel)
}
