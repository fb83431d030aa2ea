use crate::error::{CipError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io;
use std::ops::Deref;
use std::path::Path;

/// Read a binary file using memory mapping for improved performance
/// This is more efficient for large files as it doesn't load the entire file into RAM
pub fn read_binary_file_mmap(path: impl AsRef<Path>) -> io::Result<Mmap> {
    let file = File::open(path)?;
    // Safety: The file is not modified while the mmap is active
    unsafe { Mmap::map(&file) }
}

/// Backing bytes of an opened CIP file.
#[derive(Debug)]
pub enum FileData {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl FileData {
    /// Memory-map `path`, reporting failures as [`CipError::Io`].
    pub fn open(path: &Path) -> Result<Self> {
        read_binary_file_mmap(path)
            .map(FileData::Mapped)
            .map_err(|e| CipError::io(path, e))
    }
}

impl Deref for FileData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FileData::Mapped(mmap) => mmap,
            FileData::Owned(bytes) => bytes,
        }
    }
}
