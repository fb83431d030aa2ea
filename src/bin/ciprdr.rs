use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use ciprdr::{
    Connectivity, ExtractionConfig, ExtractionMode, ImageFolder, IndexFile, Pairing,
    PngDirectory,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::{Builder, Env};
use log::{info, warn};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ciprdr", about = "Extract particle images from CIP greyscale probe data")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write images for all events inside a time window
    Extract(ExtractArgs),
    /// Locate the event matching a time to within one millisecond
    Find {
        /// Directory holding Imageindex* and Imagefile* files
        dir: PathBuf,
        /// Time as YYYY-MM-DDTHH:MM:SS[.fff]
        time: NaiveDateTime,
        #[arg(long, value_enum, default_value_t = PairingArg::Sort)]
        pairing: PairingArg,
    },
    /// Print the timestamps of an index file
    Timestamps {
        index_file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PairingArg {
    Sort,
    Suffix,
}

impl From<PairingArg> for Pairing {
    fn from(arg: PairingArg) -> Self {
        match arg {
            PairingArg::Sort => Pairing::Sort,
            PairingArg::Suffix => Pairing::Suffix,
        }
    }
}

#[derive(Debug, Args)]
struct ExtractArgs {
    /// Directory holding Imageindex* and Imagefile* files
    dir: PathBuf,

    /// JSON configuration file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start of the window (inclusive)
    #[arg(long)]
    start: Option<NaiveDateTime>,

    /// End of the window (inclusive)
    #[arg(long)]
    end: Option<NaiveDateTime>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Regular expression matched against index file names
    #[arg(long)]
    filter: Option<String>,

    /// Write one image per segmented particle
    #[arg(long)]
    single: bool,

    /// Rescale particle images to this square size
    #[arg(long)]
    output_size: Option<u32>,

    /// Drop particles whose padded side is below this
    #[arg(long)]
    minimum_size: Option<usize>,

    /// Label particles with 8-connectivity
    #[arg(long)]
    eight_connected: bool,

    #[arg(long, value_enum)]
    pairing: Option<PairingArg>,

    /// Process file pairs in parallel
    #[arg(long)]
    parallel: bool,
}

impl ExtractArgs {
    fn into_config(self) -> Result<(PathBuf, ExtractionConfig)> {
        let mut config = match &self.config {
            Some(path) => ExtractionConfig::from_json_file(path)?,
            None => {
                let (Some(start), Some(end)) = (self.start, self.end) else {
                    bail!("--start and --end are required without --config");
                };
                ExtractionConfig::builder().start(start).end(end).build()
            }
        };

        if let Some(start) = self.start {
            config.start = start;
        }
        if let Some(end) = self.end {
            config.end = end;
        }
        if let Some(output) = self.output {
            config.output_dir = output;
        }
        if self.filter.is_some() {
            config.filter = self.filter;
        }
        if self.single {
            config.mode = ExtractionMode::Single;
        }
        if self.output_size.is_some() {
            config.segmentation.output_size = self.output_size;
        }
        if let Some(minimum_size) = self.minimum_size {
            config.segmentation.minimum_size = minimum_size;
        }
        if self.eight_connected {
            config.segmentation.connectivity = Connectivity::Eight;
        }
        if let Some(pairing) = self.pairing {
            config.pairing = pairing.into();
        }
        config.parallel |= self.parallel;
        config.validate()?;
        Ok((self.dir, config))
    }
}

fn extract(args: ExtractArgs) -> Result<()> {
    let (dir, config) = args.into_config()?;
    info!(
        "Extracting {:?} images between {} and {}",
        config.mode, config.start, config.end
    );
    let folder = ImageFolder::open(&dir, config.pairing)?;
    let sink = PngDirectory::create(&config.output_dir)?;
    let report = folder.extract(&config, &sink)?;

    for failure in report.failures() {
        warn!(
            "{}: {}",
            failure.index_file.display(),
            failure.error.as_deref().unwrap_or_default()
        );
    }
    info!("Wrote {} images", report.images_written());
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn find(dir: PathBuf, time: NaiveDateTime, pairing: Pairing) -> Result<()> {
    let folder = ImageFolder::open(&dir, pairing)?;
    match folder.find_timestamp(time)? {
        Some((mut image, timestamp)) => {
            let records = image.records().count();
            println!(
                "{} event {} at {} ({} records)",
                image.origin(),
                image.timestamp_index(),
                timestamp,
                records
            );
        }
        None => println!("No event matches {}", time),
    }
    Ok(())
}

fn timestamps(path: PathBuf) -> Result<()> {
    let mut index = IndexFile::open(&path)
        .with_context(|| format!("Failed to open index file {}", path.display()))?;
    println!("{} timestamps", index.count());
    for (position, entry) in index.timestamps().enumerate() {
        match entry {
            Ok(ts) => println!("{:6} {}", position, ts),
            Err(e) => warn!("Stopped at record {}: {}", position, e),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();
    builder.init();

    match Cli::parse().command {
        Command::Extract(args) => extract(args),
        Command::Find { dir, time, pairing } => find(dir, time, pairing.into()),
        Command::Timestamps { index_file } => timestamps(index_file),
    }
}
