//! Calendar timestamps as stored in CIP index and image files

use crate::error::{CipError, Result};
use bon::Builder;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A timestamp record (16 bytes, eight little‑endian i16 fields):
/// year, month, day, hour, minute, second, milliseconds, weekday.
///
/// Fields are kept exactly as decoded. The weekday is redundant and is not
/// consulted when converting to a calendar point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Builder, Serialize, Deserialize)]
pub struct Timestamp {
    pub year: i16,
    pub month: i16,
    pub day: i16,
    pub hour: i16,
    pub minute: i16,
    pub second: i16,
    pub milliseconds: i16,
    #[builder(default)]
    pub weekday: i16,
}

impl Timestamp {
    /// Size of one encoded timestamp record in bytes.
    pub const SIZE: usize = 16;

    /// Decode a timestamp from the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(CipError::Decode {
                what: "timestamp record",
                needed: Self::SIZE,
                available: bytes.len(),
            });
        }
        let mut input = &bytes[..Self::SIZE];
        crate::parser::parse_timestamp(&mut input).map_err(|_| CipError::Decode {
            what: "timestamp record",
            needed: Self::SIZE,
            available: bytes.len(),
        })
    }

    /// Convert to a calendar point with millisecond resolution.
    pub fn to_datetime(&self) -> Result<NaiveDateTime> {
        let field = |v: i16| u32::try_from(v).ok();
        let datetime = || {
            NaiveDate::from_ymd_opt(i32::from(self.year), field(self.month)?, field(self.day)?)?
                .and_hms_milli_opt(
                    field(self.hour)?,
                    field(self.minute)?,
                    field(self.second)?,
                    field(self.milliseconds)?,
                )
        };
        datetime().ok_or(CipError::InvalidTimestamp(*self))
    }

    /// Whether the fields form a valid Gregorian calendar point.
    pub fn is_valid(&self) -> bool {
        self.to_datetime().is_ok()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.milliseconds
        )
    }
}
