//! Types for representing particle-image records in a CIP image file

use bon::Builder;
use chrono::{NaiveDateTime, TimeDelta};
use ndarray::Array2;

/// Number of greyscale codes in one slice (one scan of the diode array).
pub const SLICE_WIDTH: usize = 64;

/// Number of header bits whose value must be zero in a clean record header.
const RESERVED_HEADER_BITS: usize = 56;

/// One particle image: a 64‑code header slice followed by `slice_count`
/// image slices of 64 codes each (codes in {0, 1, 2, 3}).
///
/// Counters and the elapsed-time fields are read from bit fields of the
/// header slice. A record with `valid == false` is the end-of-event sentinel
/// and carries no data.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct ParticleImageRecord {
    pub air_speed: u32,
    pub particle_count: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub milliseconds: u32,
    pub microseconds: u32,
    pub slice_count: usize,
    #[builder(default = true)]
    pub valid: bool,
    pub header: [u8; SLICE_WIDTH],
    pub slices: Array2<u8>,
}

impl ParticleImageRecord {
    /// The end-of-event marker returned once an event holds no more records.
    pub fn sentinel() -> Self {
        Self {
            air_speed: 0,
            particle_count: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
            milliseconds: 0,
            microseconds: 0,
            slice_count: 0,
            valid: false,
            header: [0; SLICE_WIDTH],
            slices: Array2::zeros((0, SLICE_WIDTH)),
        }
    }

    /// Elapsed time of this record relative to its event's base time.
    pub fn elapsed(&self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.hours))
            + TimeDelta::minutes(i64::from(self.minutes))
            + TimeDelta::seconds(i64::from(self.seconds))
            + TimeDelta::milliseconds(i64::from(self.milliseconds))
            + TimeDelta::microseconds(i64::from(self.microseconds))
    }

    /// Absolute time of this record given its event's base time.
    pub fn time(&self, base: NaiveDateTime) -> NaiveDateTime {
        base + self.elapsed()
    }

    /// Bit `index` (0..128) of the header.
    pub fn header_bit(&self, index: usize) -> u8 {
        header_bit(&self.header, index)
    }

    /// Whether the reserved leading header bits are all zero.
    pub fn is_well_formed(&self) -> bool {
        self.valid && (0..RESERVED_HEADER_BITS).all(|i| self.header_bit(i) == 0)
    }
}

/// Returns header bit `index`; each 2-bit code holds bits `2k` (low) and `2k + 1` (high).
pub fn header_bit(header: &[u8; SLICE_WIDTH], index: usize) -> u8 {
    (header[index / 2] >> (index % 2)) & 1
}

/// Interpret header bits `lsb..=msb` as an unsigned number.
pub fn header_number(header: &[u8; SLICE_WIDTH], lsb: usize, msb: usize) -> u32 {
    (lsb..=msb)
        .rev()
        .fold(0, |acc, i| (acc << 1) | u32::from(header_bit(header, i)))
}
