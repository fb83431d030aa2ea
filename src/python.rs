//! Python bindings, mirroring the `ciprdr` Python package interface.

use crate::config::{ExtractionConfig, ExtractionMode, Pairing};
use crate::error::CipError;
use crate::folder::ImageFolder;
use crate::image_file::ImageFile;
use crate::index_file::IndexFile;
use crate::processing::SegmentationConfig;
use crate::utils::PngDirectory;
use chrono::NaiveDateTime;
use pyo3::{
    Bound, PyErr, PyResult,
    exceptions::{PyFileNotFoundError, PyIndexError, PyValueError},
    pyfunction, pymodule,
    types::{PyModule, PyModuleMethods},
    wrap_pyfunction,
};
use std::path::PathBuf;

impl From<CipError> for PyErr {
    fn from(err: CipError) -> PyErr {
        match &err {
            CipError::Io { .. } => PyFileNotFoundError::new_err(err.to_string()),
            CipError::OutOfRange { .. } => PyIndexError::new_err(err.to_string()),
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}

/// Decode all timestamps of an index file.
#[pyfunction]
fn read_index_file(path: PathBuf) -> PyResult<Vec<NaiveDateTime>> {
    let mut index = IndexFile::open(path)?;
    let times = index
        .timestamps()
        .map(|entry| entry.and_then(|ts| ts.to_datetime()))
        .collect::<crate::Result<Vec<_>>>()?;
    Ok(times)
}

/// Decode the slices of every record of one event of an image file.
#[pyfunction]
fn read_event(path: PathBuf, timestamp_index: usize) -> PyResult<Vec<Vec<Vec<u8>>>> {
    let mut image = ImageFile::open(path)?;
    image.seek_timestamp(timestamp_index)?;
    let records: Vec<Vec<Vec<u8>>> = image
        .records()
        .map(|record| {
            record
                .slices
                .rows()
                .into_iter()
                .map(|row| row.to_vec())
                .collect::<Vec<_>>()
        })
        .collect();
    Ok(records)
}

fn run_extraction(
    path: PathBuf,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    mode: ExtractionMode,
    output_path: Option<PathBuf>,
    regexp: Option<String>,
    output_size: Option<u32>,
) -> PyResult<usize> {
    let config = ExtractionConfig::builder()
        .start(start_time)
        .end(end_time)
        .mode(mode)
        .output_dir(output_path.unwrap_or_else(|| PathBuf::from(".")))
        .maybe_filter(regexp)
        .segmentation(SegmentationConfig::builder().maybe_output_size(output_size).build())
        .build();
    let folder = ImageFolder::open(&path, Pairing::Sort)?;
    let sink = PngDirectory::create(&config.output_dir)?;
    let report = folder.extract(&config, &sink)?;
    Ok(report.images_written())
}

/// Write one combined image per event in `[start_time, end_time]`.
///
/// Returns the number of images written.
#[pyfunction]
#[pyo3(signature = (path, start_time, end_time, output_path = None, regexp = None))]
fn extract_combined_images(
    path: PathBuf,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    output_path: Option<PathBuf>,
    regexp: Option<String>,
) -> PyResult<usize> {
    run_extraction(
        path,
        start_time,
        end_time,
        ExtractionMode::Combined,
        output_path,
        regexp,
        None,
    )
}

/// Write one image per segmented particle for events in `[start_time, end_time]`.
///
/// Returns the number of images written.
#[pyfunction]
#[pyo3(signature = (path, start_time, end_time, output_path = None, regexp = None, output_size = None))]
fn extract_single_images(
    path: PathBuf,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    output_path: Option<PathBuf>,
    regexp: Option<String>,
    output_size: Option<u32>,
) -> PyResult<usize> {
    run_extraction(
        path,
        start_time,
        end_time,
        ExtractionMode::Single,
        output_path,
        regexp,
        output_size,
    )
}

/// Locate the event matching `time` to within one millisecond.
///
/// Returns `(image_file, timestamp_index, base_time)` or `None`.
#[pyfunction]
fn find_timestamp(
    path: PathBuf,
    time: NaiveDateTime,
) -> PyResult<Option<(String, usize, NaiveDateTime)>> {
    let folder = ImageFolder::open(&path, Pairing::Sort)?;
    match folder.find_timestamp(time)? {
        Some((image, timestamp)) => Ok(Some((
            image.origin().to_string(),
            image.timestamp_index(),
            timestamp.to_datetime()?,
        ))),
        None => Ok(None),
    }
}

/// A Python module implemented in Rust. The name of this function must match
/// the `lib.name` setting in the `Cargo.toml`, else Python will not be able to
/// import the module.
#[pymodule]
fn ciprdr(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(read_index_file, m)?)?;
    m.add_function(wrap_pyfunction!(read_event, m)?)?;
    m.add_function(wrap_pyfunction!(extract_combined_images, m)?)?;
    m.add_function(wrap_pyfunction!(extract_single_images, m)?)?;
    m.add_function(wrap_pyfunction!(find_timestamp, m)?)?;
    Ok(())
}
