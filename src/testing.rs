//! Synthetic CIP files for tests.

use crate::error::Result;
use crate::image_file::BLOCK_PAYLOAD_SIZE;
use crate::parser::particle_parser::BOUNDARY_CODES;
use crate::types::{SLICE_WIDTH, Timestamp};
use crate::utils::ImageSink;
use chrono::{NaiveDate, NaiveDateTime};
use ndarray::{Array2, ArrayView2};
use std::ops::RangeInclusive;
use std::sync::Mutex;

pub fn timestamp(hour: i16, minute: i16, second: i16, milliseconds: i16) -> Timestamp {
    Timestamp::builder()
        .year(2016)
        .month(10)
        .day(14)
        .hour(hour)
        .minute(minute)
        .second(second)
        .milliseconds(milliseconds)
        .weekday(5)
        .build()
}

pub fn datetime(hour: u32, minute: u32, second: u32, milliseconds: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2016, 10, 14)
        .and_then(|d| d.and_hms_milli_opt(hour, minute, second, milliseconds))
        .unwrap()
}

pub fn encode_timestamp(ts: &Timestamp) -> Vec<u8> {
    [
        ts.year,
        ts.month,
        ts.day,
        ts.hour,
        ts.minute,
        ts.second,
        ts.milliseconds,
        ts.weekday,
    ]
    .iter()
    .flat_map(|v| v.to_le_bytes())
    .collect()
}

pub fn encode_index(timestamps: &[Timestamp]) -> Vec<u8> {
    let mut bytes = (timestamps.len() as i64).to_le_bytes().to_vec();
    for ts in timestamps {
        bytes.extend(encode_timestamp(ts));
    }
    bytes
}

/// Header whose slice field declares `declared` slices (header included).
pub fn header_with_slices(declared: u8) -> [u8; SLICE_WIDTH] {
    let mut header = [0u8; SLICE_WIDTH];
    // bits 120..=127 live in codes 60..=63, two bits each
    for k in 0..4 {
        header[60 + k] = (declared >> (2 * k)) & 0x3;
    }
    header
}

/// Header with `value` written into bits `lsb..=msb` for every given field.
pub fn header_with_fields(fields: &[(RangeInclusive<usize>, u32)]) -> [u8; SLICE_WIDTH] {
    let mut header = [0u8; SLICE_WIDTH];
    for (bits, value) in fields {
        let value = *value;
        for (shift, bit) in bits.clone().enumerate() {
            let set = ((value >> shift) & 1) as u8;
            header[bit / 2] |= set << (bit % 2);
        }
    }
    header
}

/// Compress codes: packed triples where possible, single-code bytes for the rest.
pub fn compress(codes: &[u8]) -> Vec<u8> {
    let mut chunks = codes.chunks_exact(3);
    let mut bytes: Vec<u8> = chunks
        .by_ref()
        .map(|c| 0b0100_0000 | (c[0] << 4) | (c[1] << 2) | c[2])
        .collect();
    bytes.extend(chunks.remainder().iter().map(|&c| 0b0000_0100 | c));
    bytes
}

/// A boundary of exactly [`BOUNDARY_CODES`] clear codes: one literal and a run.
pub fn boundary() -> Vec<u8> {
    vec![0b0000_0111, 0x80 | (BOUNDARY_CODES as u8 - 1)]
}

/// Compressed payload holding one record per slice-code array.
pub fn encode_records(records: &[Array2<u8>]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for slices in records {
        assert_eq!(slices.ncols(), SLICE_WIDTH);
        bytes.extend(boundary());
        let mut codes = header_with_slices(slices.nrows() as u8 + 1).to_vec();
        codes.extend(slices.iter().copied());
        bytes.extend(compress(&codes));
    }
    bytes
}

/// One image-file block: base timestamp plus filler-padded payload.
pub fn encode_block(ts: &Timestamp, records: &[Array2<u8>]) -> Vec<u8> {
    let mut payload = encode_records(records);
    assert!(payload.len() <= BLOCK_PAYLOAD_SIZE);
    payload.resize(BLOCK_PAYLOAD_SIZE, 0);
    let mut block = encode_timestamp(ts);
    block.extend(payload);
    block
}

/// Slice codes that are all clear except for `shadow` at the given cells.
pub fn slices_with(rows: usize, shadow: &[(usize, usize)], code: u8) -> Array2<u8> {
    let mut slices = Array2::from_elem((rows, SLICE_WIDTH), 3u8);
    for &(r, c) in shadow {
        slices[[r, c]] = code;
    }
    slices
}

/// Keeps written images in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub images: Mutex<Vec<(String, Array2<u8>)>>,
}

impl MemorySink {
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .images
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl ImageSink for MemorySink {
    fn write(&self, name: &str, image: ArrayView2<'_, u8>) -> Result<()> {
        self.images
            .lock()
            .unwrap()
            .push((name.to_string(), image.to_owned()));
        Ok(())
    }
}
