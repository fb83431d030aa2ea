use crate::config::{ExtractionConfig, ExtractionMode, Pairing};
use crate::error::{CipError, Result};
use crate::image_file::ImageFile;
use crate::index_file::IndexFile;
use crate::processing::{reconstruct_combined, reconstruct_per_record, segment};
use crate::types::Timestamp;
use crate::utils::{ImageSink, combined_image_name, particle_image_name};
use chrono::{NaiveDateTime, TimeDelta};
use itertools::{EitherOrBoth, Itertools};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// File name prefix of index files.
pub const INDEX_PREFIX: &str = "Imageindex";

/// File name prefix of image files.
pub const IMAGE_PREFIX: &str = "Imagefile";

/// Maximum distance, in milliseconds, between a query time and a matching timestamp.
pub const MATCH_TOLERANCE_MS: i64 = 1;

/// An index file and the image file it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilePair {
    pub index_file: PathBuf,
    pub image_file: PathBuf,
}

/// Outcome of extracting one file pair.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub index_file: PathBuf,
    pub image_file: PathBuf,
    /// Events whose timestamp fell inside the window.
    pub events: usize,
    pub images_written: usize,
    pub error: Option<String>,
}

impl FileReport {
    fn new(pair: &FilePair) -> Self {
        Self {
            index_file: pair.index_file.clone(),
            image_file: pair.image_file.clone(),
            events: 0,
            images_written: 0,
            error: None,
        }
    }
}

/// Per-file outcomes of a batch extraction, in pair order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionReport {
    pub files: Vec<FileReport>,
}

impl ExtractionReport {
    pub fn images_written(&self) -> usize {
        self.files.iter().map(|f| f.images_written).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| f.error.is_some())
    }
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

fn suffix<'a>(path: &'a Path, prefix: &str) -> &'a str {
    let name = file_name(path);
    name.strip_prefix(prefix).unwrap_or(name)
}

fn list_files(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/{}*",
        glob::Pattern::escape(&dir.to_string_lossy()),
        prefix
    );
    let files = glob::glob(&pattern)?
        .filter_map(|entry| match entry {
            Ok(path) if path.is_file() => Some(path),
            Ok(_) => None,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .sorted()
        .collect();
    Ok(files)
}

/// Positions of the index records whose timestamps fall inside `[start, end]`.
///
/// Records that are not valid calendar points are skipped. A truncated
/// record ends the scan.
pub fn positions_in_window(
    index: &mut IndexFile,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Vec<usize> {
    let first = index.position();
    let mut positions = Vec::new();
    for (position, entry) in (first..).zip(index.timestamps()) {
        let ts = match entry {
            Ok(ts) => ts,
            Err(e) => {
                warn!("No more usable timestamps: {}", e);
                break;
            }
        };
        match ts.to_datetime() {
            Ok(time) if start <= time && time <= end => positions.push(position),
            Ok(_) => {}
            Err(e) => warn!("Skipping record {}: {}", position, e),
        }
    }
    positions
}

/// A directory of paired CIP index and image files.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    pairs: Vec<FilePair>,
}

impl ImageFolder {
    /// Collect `Imageindex*` and `Imagefile*` files in `dir` and pair them.
    pub fn open(dir: impl AsRef<Path>, pairing: Pairing) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(CipError::io(
                dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }
        let index_files = list_files(dir, INDEX_PREFIX)?;
        let image_files = list_files(dir, IMAGE_PREFIX)?;
        info!(
            "Found {} index files and {} image files in {}",
            index_files.len(),
            image_files.len(),
            dir.display()
        );
        Self::from_files(index_files, image_files, pairing)
    }

    /// Pair explicit file lists. Both lists are sorted first.
    pub fn from_files(
        index_files: Vec<PathBuf>,
        image_files: Vec<PathBuf>,
        pairing: Pairing,
    ) -> Result<Self> {
        let pairs = index_files
            .into_iter()
            .sorted()
            .zip_longest(image_files.into_iter().sorted())
            .map(|entry| match entry {
                EitherOrBoth::Both(index_file, image_file) => {
                    let (a, b) = (
                        suffix(&index_file, INDEX_PREFIX),
                        suffix(&image_file, IMAGE_PREFIX),
                    );
                    if a != b {
                        if pairing == Pairing::Suffix {
                            return Err(CipError::Pairing(format!(
                                "'{}' does not match '{}'",
                                index_file.display(),
                                image_file.display()
                            )));
                        }
                        warn!(
                            "Pairing '{}' with '{}' by sort order",
                            index_file.display(),
                            image_file.display()
                        );
                    }
                    Ok(FilePair {
                        index_file,
                        image_file,
                    })
                }
                EitherOrBoth::Left(index_file) => Err(CipError::Pairing(format!(
                    "no image file for '{}'",
                    index_file.display()
                ))),
                EitherOrBoth::Right(image_file) => Err(CipError::Pairing(format!(
                    "no index file for '{}'",
                    image_file.display()
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { pairs })
    }

    pub fn pairs(&self) -> &[FilePair] {
        &self.pairs
    }

    /// Extract images for every event inside the configured window.
    ///
    /// Fails only on an invalid configuration; failures of individual files
    /// are recorded in the report and do not stop the batch.
    pub fn extract(
        &self,
        config: &ExtractionConfig,
        sink: &dyn ImageSink,
    ) -> Result<ExtractionReport> {
        config.validate()?;
        let filter = config.filter.as_deref().map(Regex::new).transpose()?;
        let selected: Vec<&FilePair> = self
            .pairs
            .iter()
            .filter(|pair| {
                filter
                    .as_ref()
                    .is_none_or(|re| re.is_match(file_name(&pair.index_file)))
            })
            .collect();

        let process = |pair: &FilePair| {
            let mut report = FileReport::new(pair);
            if let Err(e) = extract_pair(pair, config, sink, &mut report) {
                error!("Failed to extract '{}': {}", pair.index_file.display(), e);
                report.error = Some(e.to_string());
            }
            report
        };

        let files = if config.parallel {
            selected.par_iter().map(|&pair| process(pair)).collect()
        } else {
            selected.iter().map(|&pair| process(pair)).collect()
        };
        Ok(ExtractionReport { files })
    }

    /// Find the first event, in file order, whose index timestamp lies within
    /// [`MATCH_TOLERANCE_MS`] of `time`.
    ///
    /// Returns the image file positioned at that event with the event's base
    /// timestamp, or `None` if no file has a match.
    pub fn find_timestamp(&self, time: NaiveDateTime) -> Result<Option<(ImageFile, Timestamp)>> {
        let tolerance = TimeDelta::milliseconds(MATCH_TOLERANCE_MS);
        for pair in &self.pairs {
            let mut index = match IndexFile::open(&pair.index_file) {
                Ok(index) => index,
                Err(e) => {
                    warn!("Skipping '{}': {}", pair.index_file.display(), e);
                    continue;
                }
            };
            let found = positions_in_window(&mut index, time - tolerance, time + tolerance)
                .first()
                .copied();
            if let Some(position) = found {
                debug!(
                    "Found {} at record {} of '{}'",
                    time,
                    position,
                    pair.index_file.display()
                );
                let opened = ImageFile::open(&pair.image_file)
                    .and_then(|mut image| Ok((image.seek_timestamp(position)?, image)));
                match opened {
                    Ok((timestamp, image)) => return Ok(Some((image, timestamp))),
                    Err(e) => warn!("Skipping '{}': {}", pair.image_file.display(), e),
                }
            }
        }
        Ok(None)
    }
}

/// Extract one pair, counting events and written images into `report` as
/// they are processed.
fn extract_pair(
    pair: &FilePair,
    config: &ExtractionConfig,
    sink: &dyn ImageSink,
    report: &mut FileReport,
) -> Result<()> {
    info!("Opening index file {}", pair.index_file.display());
    let mut index = IndexFile::open(&pair.index_file)?;
    let positions = positions_in_window(&mut index, config.start, config.end);
    index.close();

    if positions.is_empty() {
        return Ok(());
    }

    let mut image = ImageFile::open(&pair.image_file)?;
    for position in positions {
        report.events += 1;
        extract_event(&mut image, position, config, sink, &mut report.images_written)?;
    }
    image.close();
    Ok(())
}

/// Reconstruct event `position` of `image` and write its images, adding each
/// written image to `written`.
fn extract_event(
    image: &mut ImageFile,
    position: usize,
    config: &ExtractionConfig,
    sink: &dyn ImageSink,
    written: &mut usize,
) -> Result<()> {
    let base = image.seek_timestamp(position)?;
    match config.mode {
        ExtractionMode::Combined => match reconstruct_combined(image) {
            Some(raster) => {
                debug!("Event {}: {} slices", base, raster.height());
                sink.write(&combined_image_name(&base), raster.view())?;
                *written += 1;
            }
            None => debug!("Event {} holds no records", base),
        },
        ExtractionMode::Single => {
            let mut sequence = 0;
            for raster in reconstruct_per_record(image) {
                for particle in segment(&raster, &config.segmentation) {
                    sink.write(&particle_image_name(&base, sequence), particle.image.view())?;
                    sequence += 1;
                    *written += 1;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::SegmentationConfig;
    use crate::testing::{
        MemorySink, datetime, encode_block, encode_index, slices_with, timestamp,
    };
    use crate::utils::PngDirectory;
    use ndarray::Array2;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Write a pair of files with one block per timestamp, each block holding `records`.
    fn write_pair(dir: &Path, suffix: &str, stamps: &[Timestamp], records: &[Array2<u8>]) {
        fs::write(
            dir.join(format!("{}{}", INDEX_PREFIX, suffix)),
            encode_index(stamps),
        )
        .unwrap();
        let image: Vec<u8> = stamps
            .iter()
            .flat_map(|ts| encode_block(ts, records))
            .collect();
        fs::write(dir.join(format!("{}{}", IMAGE_PREFIX, suffix)), image).unwrap();
    }

    fn window(start: NaiveDateTime, end: NaiveDateTime) -> ExtractionConfig {
        ExtractionConfig::builder().start(start).end(end).build()
    }

    #[test]
    fn test_positions_in_window() {
        let stamps = [
            timestamp(10, 37, 0, 999),
            timestamp(10, 37, 1, 0),
            timestamp(10, 37, 1, 1),
        ];
        let mut index = IndexFile::from_bytes(encode_index(&stamps)).unwrap();
        let positions =
            positions_in_window(&mut index, datetime(10, 37, 1, 0), datetime(10, 37, 1, 1));
        assert_eq!(positions, vec![1, 2]);
    }

    #[test]
    fn test_positions_skip_invalid_timestamps() {
        let mut bad = timestamp(10, 37, 1, 0);
        bad.month = 13;
        let stamps = [bad, timestamp(10, 37, 1, 0)];
        let mut index = IndexFile::from_bytes(encode_index(&stamps)).unwrap();
        let positions =
            positions_in_window(&mut index, datetime(10, 0, 0, 0), datetime(11, 0, 0, 0));
        assert_eq!(positions, vec![1]);
    }

    #[test]
    fn test_pairing_by_sort_order() {
        let folder = ImageFolder::from_files(
            vec!["d/Imageindex_b".into(), "d/Imageindex_a".into()],
            vec!["d/Imagefile_x".into(), "d/Imagefile_a".into()],
            Pairing::Sort,
        )
        .unwrap();
        assert_eq!(folder.pairs()[0].index_file, PathBuf::from("d/Imageindex_a"));
        assert_eq!(folder.pairs()[0].image_file, PathBuf::from("d/Imagefile_a"));
        assert_eq!(folder.pairs()[1].image_file, PathBuf::from("d/Imagefile_x"));
    }

    #[test]
    fn test_pairing_by_suffix_rejects_mismatch() {
        let result = ImageFolder::from_files(
            vec!["d/Imageindex_a".into(), "d/Imageindex_b".into()],
            vec!["d/Imagefile_a".into(), "d/Imagefile_c".into()],
            Pairing::Suffix,
        );
        assert!(matches!(result, Err(CipError::Pairing(_))));
    }

    #[test]
    fn test_pairing_count_mismatch() {
        let result = ImageFolder::from_files(
            vec!["d/Imageindex_a".into(), "d/Imageindex_b".into()],
            vec!["d/Imagefile_a".into()],
            Pairing::Sort,
        );
        assert!(matches!(result, Err(CipError::Pairing(_))));
    }

    #[test]
    fn test_open_missing_directory() {
        let dir = TempDir::new().unwrap();
        let result = ImageFolder::open(dir.path().join("absent"), Pairing::Sort);
        assert!(matches!(result, Err(CipError::Io { .. })));
    }

    #[test]
    fn test_extract_combined() {
        let dir = TempDir::new().unwrap();
        let stamps = [
            timestamp(10, 36, 59, 0),
            timestamp(10, 37, 0, 250),
            timestamp(10, 37, 30, 0),
        ];
        let records = [slices_with(2, &[(0, 0)], 0), slices_with(3, &[(1, 1)], 2)];
        write_pair(dir.path(), "_a", &stamps, &records);

        let folder = ImageFolder::open(dir.path(), Pairing::Suffix).unwrap();
        let sink = MemorySink::default();
        let report = folder
            .extract(&window(datetime(10, 37, 0, 0), datetime(10, 38, 0, 0)), &sink)
            .unwrap();

        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].events, 2);
        assert_eq!(report.images_written(), 2);
        assert_eq!(
            sink.names(),
            vec![
                "cip_image_20161014_103700_250.png",
                "cip_image_20161014_103730_000.png",
            ]
        );

        let images = sink.images.lock().unwrap();
        let raster = &images[0].1;
        assert_eq!(raster.dim(), (5, 64));
        assert_eq!(raster[[0, 0]], 255);
        assert_eq!(raster[[0, 1]], 0);
        assert_eq!(raster[[3, 1]], 85);
    }

    #[test]
    fn test_extract_single_filters_small_particles() {
        let dir = TempDir::new().unwrap();
        let mut shadow: Vec<(usize, usize)> = (0..4)
            .flat_map(|r| (10..14).map(move |c| (r, c)))
            .collect();
        shadow.push((1, 40));
        let records = [slices_with(5, &shadow, 1)];
        write_pair(dir.path(), "_a", &[timestamp(10, 37, 0, 5)], &records);

        let folder = ImageFolder::open(dir.path(), Pairing::Sort).unwrap();
        let sink = MemorySink::default();
        let config = ExtractionConfig::builder()
            .start(datetime(10, 37, 0, 0))
            .end(datetime(10, 37, 1, 0))
            .mode(ExtractionMode::Single)
            .build();
        let report = folder.extract(&config, &sink).unwrap();

        assert_eq!(report.images_written(), 1);
        let images = sink.images.lock().unwrap();
        assert_eq!(images[0].0, "cip_image_20161014_103700_005_0000.png");
        assert_eq!(images[0].1, Array2::from_elem((4, 4), 170u8));
    }

    #[test]
    fn test_extract_single_rescales() {
        let dir = TempDir::new().unwrap();
        let shadow: Vec<(usize, usize)> = (0..4)
            .flat_map(|r| (0..4).map(move |c| (r, c)))
            .collect();
        write_pair(
            dir.path(),
            "_a",
            &[timestamp(10, 37, 0, 5)],
            &[slices_with(4, &shadow, 0)],
        );

        let folder = ImageFolder::open(dir.path(), Pairing::Sort).unwrap();
        let sink = MemorySink::default();
        let config = ExtractionConfig::builder()
            .start(datetime(10, 37, 0, 0))
            .end(datetime(10, 37, 1, 0))
            .mode(ExtractionMode::Single)
            .segmentation(SegmentationConfig::builder().output_size(8).build())
            .build();
        folder.extract(&config, &sink).unwrap();

        let images = sink.images.lock().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].1, Array2::from_elem((8, 8), 255u8));
    }

    #[test]
    fn test_failed_pair_does_not_stop_batch() {
        let dir = TempDir::new().unwrap();
        let stamps = [timestamp(10, 37, 0, 0)];
        let records = [slices_with(1, &[(0, 0)], 0)];
        write_pair(dir.path(), "_a", &stamps, &records);
        write_pair(dir.path(), "_b", &stamps, &records);
        // A partial block makes the first image file unreadable.
        fs::write(dir.path().join("Imagefile_a"), vec![0u8; 100]).unwrap();

        let folder = ImageFolder::open(dir.path(), Pairing::Suffix).unwrap();
        let sink = MemorySink::default();
        let report = folder
            .extract(&window(datetime(10, 0, 0, 0), datetime(11, 0, 0, 0)), &sink)
            .unwrap();

        assert_eq!(report.files.len(), 2);
        assert!(report.files[0].error.is_some());
        assert!(report.files[1].error.is_none());
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.images_written(), 1);
    }

    #[test]
    fn test_filter_and_parallel() {
        let dir = TempDir::new().unwrap();
        let records = [slices_with(1, &[(0, 0)], 0)];
        write_pair(dir.path(), "_2016_a", &[timestamp(10, 37, 0, 0)], &records);
        write_pair(dir.path(), "_2016_b", &[timestamp(10, 37, 0, 1)], &records);
        write_pair(dir.path(), "_2017_a", &[timestamp(10, 37, 0, 2)], &records);

        let folder = ImageFolder::open(dir.path(), Pairing::Suffix).unwrap();
        let sink = MemorySink::default();
        let config = ExtractionConfig::builder()
            .start(datetime(10, 0, 0, 0))
            .end(datetime(11, 0, 0, 0))
            .filter("_2016_".to_string())
            .parallel(true)
            .build();
        let report = folder.extract(&config, &sink).unwrap();

        assert_eq!(report.files.len(), 2);
        assert!(report.files[0].index_file.ends_with("Imageindex_2016_a"));
        assert_eq!(
            sink.names(),
            vec![
                "cip_image_20161014_103700_000.png",
                "cip_image_20161014_103700_001.png",
            ]
        );
    }

    #[test]
    fn test_invalid_filter_is_an_error() {
        let folder = ImageFolder::from_files(Vec::new(), Vec::new(), Pairing::Sort).unwrap();
        let config = ExtractionConfig::builder()
            .start(datetime(10, 0, 0, 0))
            .end(datetime(11, 0, 0, 0))
            .filter("(".to_string())
            .build();
        let result = folder.extract(&config, &MemorySink::default());
        assert!(matches!(result, Err(CipError::Filter(_))));
    }

    #[test]
    fn test_find_timestamp_tolerance() {
        let dir = TempDir::new().unwrap();
        let stamps = [timestamp(10, 37, 0, 0), timestamp(10, 37, 5, 500)];
        write_pair(dir.path(), "_a", &stamps, &[slices_with(2, &[], 3)]);
        let folder = ImageFolder::open(dir.path(), Pairing::Sort).unwrap();

        let (mut image, ts) = folder
            .find_timestamp(datetime(10, 37, 5, 501))
            .unwrap()
            .unwrap();
        assert_eq!(ts, stamps[1]);
        assert_eq!(image.timestamp_index(), 1);
        assert_eq!(image.records().count(), 1);

        assert!(
            folder
                .find_timestamp(datetime(10, 37, 5, 502))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_extract_writes_png_files() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_pair(
            dir.path(),
            "_a",
            &[timestamp(10, 37, 0, 7)],
            &[slices_with(3, &[(2, 10)], 0)],
        );

        let folder = ImageFolder::open(dir.path(), Pairing::Sort).unwrap();
        let sink = PngDirectory::create(out.path().join("png")).unwrap();
        folder
            .extract(&window(datetime(10, 0, 0, 0), datetime(11, 0, 0, 0)), &sink)
            .unwrap();

        let path = out.path().join("png/cip_image_20161014_103700_007.png");
        let img = image::open(&path).unwrap().to_luma8();
        assert_eq!(img.dimensions(), (3, 64));
        assert_eq!(img.get_pixel(2, 10)[0], 255);
        assert_eq!(img.get_pixel(0, 10)[0], 0);
    }

    #[test]
    fn test_find_timestamp_skips_unreadable_image_file() {
        let dir = TempDir::new().unwrap();
        let stamps = [timestamp(10, 37, 0, 0)];
        let records = [slices_with(1, &[(0, 0)], 0)];
        write_pair(dir.path(), "_a", &stamps, &records);
        write_pair(dir.path(), "_b", &stamps, &records);
        fs::write(dir.path().join("Imagefile_a"), vec![0u8; 100]).unwrap();

        let folder = ImageFolder::open(dir.path(), Pairing::Suffix).unwrap();
        let (image, ts) = folder
            .find_timestamp(datetime(10, 37, 0, 0))
            .unwrap()
            .unwrap();
        assert!(image.origin().ends_with("Imagefile_b"));
        assert_eq!(ts, stamps[0]);
    }

    /// Accepts a fixed number of images, then fails every write.
    struct FullDisk {
        capacity: usize,
        written: Mutex<usize>,
    }

    impl ImageSink for FullDisk {
        fn write(&self, name: &str, _image: ndarray::ArrayView2<'_, u8>) -> Result<()> {
            let mut written = self.written.lock().unwrap();
            if *written >= self.capacity {
                return Err(CipError::io(
                    name,
                    std::io::Error::new(std::io::ErrorKind::StorageFull, "disk full"),
                ));
            }
            *written += 1;
            Ok(())
        }
    }

    #[test]
    fn test_report_counts_survive_failed_event() {
        let dir = TempDir::new().unwrap();
        let stamps = [
            timestamp(10, 37, 0, 0),
            timestamp(10, 37, 1, 0),
            timestamp(10, 37, 2, 0),
        ];
        write_pair(dir.path(), "_a", &stamps, &[slices_with(1, &[(0, 0)], 0)]);

        let folder = ImageFolder::open(dir.path(), Pairing::Sort).unwrap();
        let sink = FullDisk {
            capacity: 1,
            written: Mutex::new(0),
        };
        let report = folder
            .extract(&window(datetime(10, 0, 0, 0), datetime(11, 0, 0, 0)), &sink)
            .unwrap();

        let file = &report.files[0];
        assert!(file.error.as_deref().unwrap().contains("disk full"));
        assert_eq!(file.events, 2);
        assert_eq!(file.images_written, 1);
        assert_eq!(report.images_written(), 1);
    }
}
