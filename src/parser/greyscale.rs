//! Decompressor for the CIP greyscale run-length stream
//!
//! Each compressed byte is classified by its leading marker bit:
//! - `1xxxxxxx`: run byte, repeat the last emitted code `xxxxxxx` times
//! - `01aabbcc`: three codes `aa`, `bb`, `cc`
//! - `0001bbcc`: two codes `bb`, `cc`
//! - `000001cc`: one code `cc`
//! - anything else: filler, skipped
//!
//! The stream ends when the underlying bytes are exhausted.

use std::iter::FusedIterator;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Pending {
    #[default]
    Empty,
    Run(u8),
    Packed { byte: u8, remaining: u8 },
}

/// Decoder state of a greyscale stream, detached from the bytes it reads.
///
/// Lets a file handle keep its place in a block across calls without
/// copying the block out of the mapped file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamCursor {
    pos: usize,
    pending: Pending,
    last_code: u8,
}

impl StreamCursor {
    /// Number of compressed bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }
}

/// Iterator over the 2-bit greyscale codes of one compressed block.
#[derive(Debug, Clone)]
pub struct GreyscaleStream<'a> {
    data: &'a [u8],
    cursor: StreamCursor,
}

impl<'a> GreyscaleStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::resume(data, StreamCursor::default())
    }

    /// Continue decoding `data` from a previously saved cursor.
    pub fn resume(data: &'a [u8], cursor: StreamCursor) -> Self {
        Self { data, cursor }
    }

    pub fn cursor(&self) -> StreamCursor {
        self.cursor
    }

    /// Number of compressed bytes consumed so far.
    pub fn position(&self) -> usize {
        self.cursor.pos
    }

    fn classify(byte: u8) -> Pending {
        if byte & 0x80 != 0 {
            Pending::Run(byte & 0x7F)
        } else if byte & 0x40 != 0 {
            Pending::Packed { byte, remaining: 3 }
        } else if byte & 0x10 != 0 {
            Pending::Packed { byte, remaining: 2 }
        } else if byte & 0x04 != 0 {
            Pending::Packed { byte, remaining: 1 }
        } else {
            Pending::Empty
        }
    }
}

impl Iterator for GreyscaleStream<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let state = &mut self.cursor;
        loop {
            match state.pending {
                Pending::Run(n) if n > 0 => {
                    state.pending = Pending::Run(n - 1);
                    return Some(state.last_code);
                }
                Pending::Packed { byte, remaining } if remaining > 0 => {
                    let remaining = remaining - 1;
                    state.pending = Pending::Packed { byte, remaining };
                    state.last_code = (byte >> (2 * remaining)) & 0x3;
                    return Some(state.last_code);
                }
                _ => {}
            }

            let byte = *self.data.get(state.pos)?;
            state.pos += 1;
            state.pending = Self::classify(byte);
        }
    }
}

impl FusedIterator for GreyscaleStream<'_> {}
