//! Parser for the leading record count of an index file

use winnow::{Parser, binary::le_i64, error::ContextError};

/// Size of the index file header (one native word) in bytes.
pub const INDEX_HEADER_SIZE: usize = 8;

/// Parses the index file header: a little‑endian i64 record count.
pub fn parse_index_header(input: &mut &[u8]) -> Result<i64, ContextError> {
    le_i64.parse_next(input)
}
