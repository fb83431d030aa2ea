use crate::types::Timestamp;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CipError {
    #[error("I/O error for file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed file '{origin}': {reason}")]
    Format { origin: String, reason: String },

    #[error("Failed to decode {what}: needed {needed} bytes, {available} available")]
    Decode {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("Timestamp index {index} out of range for file with {count} timestamps")]
    OutOfRange { index: usize, count: usize },

    #[error("Timestamp {0} is not a valid calendar point")]
    InvalidTimestamp(Timestamp),

    #[error("Failed to write image '{}': {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid filename filter: {0}")]
    Filter(#[from] regex::Error),

    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Index and image files cannot be paired: {0}")]
    Pairing(String),

    #[error("Failed to parse configuration '{}': {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CipError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CipError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        CipError::Format {
            origin: origin.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CipError>;
