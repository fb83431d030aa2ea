use crate::error::{CipError, Result};
use crate::parser::{GreyscaleStream, StreamCursor, parse_particle_record};
use crate::types::{ParticleImageRecord, Timestamp};
use crate::utils::file_utils::FileData;
use log::debug;
use std::iter::FusedIterator;
use std::ops::Range;
use std::path::Path;

/// Size of one acquisition block: a timestamp record followed by the
/// compressed greyscale payload.
pub const BLOCK_SIZE: usize = 4112;

/// Size of the compressed greyscale payload of one block.
pub const BLOCK_PAYLOAD_SIZE: usize = BLOCK_SIZE - Timestamp::SIZE;

/// A CIP greyscale image file.
///
/// The file is a sequence of fixed-size blocks, one per acquisition event.
/// The handle keeps a cursor into one event's greyscale stream; records are
/// decoded lazily from it. The cursor starts at event 0.
#[derive(Debug)]
pub struct ImageFile {
    origin: String,
    data: FileData,
    n_timestamps: usize,
    timestamp_index: usize,
    payload: Range<usize>,
    cursor: StreamCursor,
}

impl ImageFile {
    /// Open an image file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = FileData::open(path)?;
        Self::from_data(data, path.display().to_string())
    }

    /// Decode an image file held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_data(FileData::Owned(bytes), "<memory>".to_string())
    }

    fn from_data(data: FileData, origin: String) -> Result<Self> {
        let trailing = data.len() % BLOCK_SIZE;
        if trailing != 0 {
            return Err(CipError::format(
                origin,
                format!(
                    "{} bytes is not a whole number of {}-byte blocks ({} trailing)",
                    data.len(),
                    BLOCK_SIZE,
                    trailing
                ),
            ));
        }
        let n_timestamps = data.len() / BLOCK_SIZE;
        debug!("{}: {} timestamps", origin, n_timestamps);

        let mut file = Self {
            origin,
            data,
            n_timestamps,
            timestamp_index: 0,
            payload: 0..0,
            cursor: StreamCursor::default(),
        };
        if n_timestamps > 0 {
            file.seek_timestamp(0)?;
        }
        Ok(file)
    }

    fn block(&self, index: usize) -> Result<&[u8]> {
        if index >= self.n_timestamps {
            return Err(CipError::OutOfRange {
                index,
                count: self.n_timestamps,
            });
        }
        Ok(&self.data[index * BLOCK_SIZE..(index + 1) * BLOCK_SIZE])
    }

    /// Base timestamp of event `index`, without moving the cursor.
    pub fn timestamp_at(&self, index: usize) -> Result<Timestamp> {
        Timestamp::decode(self.block(index)?)
    }

    /// Position the cursor at the first record of event `index` and return
    /// the event's base timestamp.
    pub fn seek_timestamp(&mut self, index: usize) -> Result<Timestamp> {
        let timestamp = Timestamp::decode(self.block(index)?)?;
        debug!(
            "{}: seeking to timestamp {} ({})",
            self.origin, index, timestamp
        );
        let start = index * BLOCK_SIZE + Timestamp::SIZE;
        self.payload = start..start + BLOCK_PAYLOAD_SIZE;
        self.cursor = StreamCursor::default();
        self.timestamp_index = index;
        Ok(timestamp)
    }

    /// Decode the next record of the current event.
    ///
    /// Once the event is exhausted this returns the sentinel record
    /// (`valid == false`), and keeps returning it on further calls.
    pub fn next_record(&mut self) -> ParticleImageRecord {
        let mut stream = GreyscaleStream::resume(&self.data[self.payload.clone()], self.cursor);
        let record = parse_particle_record(&mut stream);
        self.cursor = stream.cursor();
        record
    }

    /// Iterate over the valid records of the current event.
    pub fn records(&mut self) -> EventRecords<'_> {
        EventRecords {
            file: self,
            done: false,
        }
    }

    /// Number of acquisition events in the file.
    pub fn timestamp_count(&self) -> usize {
        self.n_timestamps
    }

    /// Event the cursor is positioned in.
    pub fn timestamp_index(&self) -> usize {
        self.timestamp_index
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Release the file.
    pub fn close(self) {
        drop(self);
    }
}

/// Lazy, finite iterator over the records of one event. Ends at the first
/// sentinel and never restarts.
pub struct EventRecords<'a> {
    file: &'a mut ImageFile,
    done: bool,
}

impl Iterator for EventRecords<'_> {
    type Item = ParticleImageRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let record = self.file.next_record();
        if record.valid {
            Some(record)
        } else {
            self.done = true;
            None
        }
    }
}

impl FusedIterator for EventRecords<'_> {}
