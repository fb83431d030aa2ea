use crate::error::{CipError, Result};
use crate::parser::{INDEX_HEADER_SIZE, parse_index_header};
use crate::types::Timestamp;
use crate::utils::file_utils::FileData;
use log::debug;
use std::iter::FusedIterator;
use std::path::Path;

/// A CIP index file: a record count followed by packed timestamp records.
///
/// The handle owns a sequential read cursor; each call to
/// [`IndexFile::next_timestamp`] advances it by one record.
#[derive(Debug)]
pub struct IndexFile {
    origin: String,
    data: FileData,
    count: usize,
    cursor: usize,
}

impl IndexFile {
    /// Open and validate an index file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = FileData::open(path)?;
        Self::from_data(data, path.display().to_string())
    }

    /// Decode an index file held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_data(FileData::Owned(bytes), "<memory>".to_string())
    }

    fn from_data(data: FileData, origin: String) -> Result<Self> {
        let mut input: &[u8] = &data;
        let declared = parse_index_header(&mut input).map_err(|_| {
            CipError::format(
                origin.clone(),
                format!(
                    "index header needs {} bytes, file has {}",
                    INDEX_HEADER_SIZE,
                    data.len()
                ),
            )
        })?;
        let count = usize::try_from(declared).map_err(|_| {
            CipError::format(origin.clone(), format!("negative record count {}", declared))
        })?;

        let available = input.len() / Timestamp::SIZE;
        if available < count {
            return Err(CipError::format(
                origin,
                format!(
                    "header declares {} timestamps but only {} are present",
                    count, available
                ),
            ));
        }
        if input.len() > count * Timestamp::SIZE {
            debug!(
                "{}: ignoring {} trailing bytes",
                origin,
                input.len() - count * Timestamp::SIZE
            );
        }

        Ok(Self {
            origin,
            data,
            count,
            cursor: 0,
        })
    }

    /// Number of timestamp records declared by the file header.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Index of the record the next call to [`IndexFile::next_timestamp`] returns.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Decode the next timestamp, or `Ok(None)` once all declared records were read.
    pub fn next_timestamp(&mut self) -> Result<Option<Timestamp>> {
        if self.cursor >= self.count {
            return Ok(None);
        }
        let offset = INDEX_HEADER_SIZE + self.cursor * Timestamp::SIZE;
        let bytes = self.data.get(offset..).unwrap_or_default();
        let timestamp = Timestamp::decode(bytes).map_err(|e| {
            CipError::format(
                self.origin.clone(),
                format!("record {} is truncated: {}", self.cursor, e),
            )
        })?;
        self.cursor += 1;
        Ok(Some(timestamp))
    }

    /// Move the cursor back to the first record.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Iterate over the remaining timestamps. Iteration stops after the first error.
    pub fn timestamps(&mut self) -> Timestamps<'_> {
        Timestamps {
            file: self,
            failed: false,
        }
    }

    /// Release the file.
    pub fn close(self) {
        drop(self);
    }
}

/// Iterator over the remaining records of an [`IndexFile`].
pub struct Timestamps<'a> {
    file: &'a mut IndexFile,
    failed: bool,
}

impl Iterator for Timestamps<'_> {
    type Item = Result<Timestamp>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.file.next_timestamp() {
            Ok(Some(ts)) => Some(Ok(ts)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for Timestamps<'_> {}
