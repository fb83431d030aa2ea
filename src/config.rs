//! Extraction settings, buildable in code or loadable from a JSON file.
//!
//! ```json
//! {
//!   "start": "2016-10-14T10:37:00",
//!   "end": "2016-10-14T10:38:00",
//!   "mode": "single",
//!   "output_dir": "particles",
//!   "filter": "Imageindex_2016",
//!   "segmentation": { "minimum_size": 6, "connectivity": "eight", "output_size": 32 },
//!   "pairing": "suffix",
//!   "parallel": true
//! }
//! ```

use crate::error::{CipError, Result};
use crate::processing::SegmentationConfig;
use bon::Builder;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// How the records of one event are turned into images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// One image per event with all records stacked.
    #[default]
    Combined,
    /// One image per segmented particle.
    Single,
}

/// How index files are matched with image files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pairing {
    /// The i-th sorted index file goes with the i-th sorted image file.
    #[default]
    #[serde(alias = "sort_order")]
    Sort,
    /// Files pair only when their names agree after the prefix.
    Suffix,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// First selected time (inclusive).
    pub start: NaiveDateTime,

    /// Last selected time (inclusive).
    pub end: NaiveDateTime,

    #[builder(default)]
    #[serde(default)]
    pub mode: ExtractionMode,

    #[builder(default = default_output_dir())]
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Regular expression applied to index file names.
    #[serde(default)]
    pub filter: Option<String>,

    #[builder(default)]
    #[serde(default)]
    pub segmentation: SegmentationConfig,

    #[builder(default)]
    #[serde(default)]
    pub pairing: Pairing,

    /// Process file pairs on the rayon thread pool.
    #[builder(default)]
    #[serde(default)]
    pub parallel: bool,
}

impl ExtractionConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| CipError::io(path, e))?;
        let config: Self = serde_json::from_str(&text).map_err(|source| CipError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(CipError::InvalidConfig(format!(
                "start {} is after end {}",
                self.start, self.end
            )));
        }
        if self.segmentation.output_size == Some(0) {
            return Err(CipError::InvalidConfig(
                "output_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
