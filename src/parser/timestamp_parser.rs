use crate::types::Timestamp;
use winnow::{Parser, binary::le_i16, error::ContextError};

/// Parses a timestamp record (16 bytes):
/// - 8 little‑endian i16 values: year, month, day, hour, minute, second,
///   milliseconds, weekday
pub fn parse_timestamp(input: &mut &[u8]) -> Result<Timestamp, ContextError> {
    let year = le_i16.parse_next(input)?;
    let month = le_i16.parse_next(input)?;
    let day = le_i16.parse_next(input)?;
    let hour = le_i16.parse_next(input)?;
    let minute = le_i16.parse_next(input)?;
    let second = le_i16.parse_next(input)?;
    let milliseconds = le_i16.parse_next(input)?;
    let weekday = le_i16.parse_next(input)?;

    Ok(Timestamp::builder()
        .year(year)
        .month(month)
        .day(day)
        .hour(hour)
        .minute(minute)
        .second(second)
        .milliseconds(milliseconds)
        .weekday(weekday)
        .build())
}
