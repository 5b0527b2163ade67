//! motionmux CLI Tool
//!
//! Command-line interface for turning live photo still/video pairs into
//! motion photos.

mod config;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use config::Settings;
use motionmux_core::{EmbeddedSegment, MatchMode, PairResolver};
use motionmux_engine::annotator::read_metadata;
use motionmux_engine::{
    BatchReport, CollisionPolicy, CommandConverter, ExifTool, MetadataStore, Pipeline,
    PipelineConfig,
};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "motionmux")]
#[command(about = "Merge live photo stills and videos into motion photos")]
#[command(version)]
struct Cli {
    /// Optional TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mux a directory of live photos, or a single still/video pair
    Mux(MuxArgs),

    /// Show the motion photo layout of a file
    Inspect {
        /// Motion photo to inspect
        input: PathBuf,

        /// Write the embedded video to this path
        #[arg(long)]
        extract: Option<PathBuf>,
    },
}

#[derive(Args)]
#[command(group(ArgGroup::new("input").required(true).multiple(true).args(["dir", "still", "video"])))]
struct MuxArgs {
    /// Directory to scan for pairs
    #[arg(short, long, conflicts_with_all = ["still", "video"])]
    dir: Option<PathBuf>,

    /// Still image of a single pair (its video is looked up if omitted)
    #[arg(long)]
    still: Option<PathBuf>,

    /// Video of a single pair (its still is looked up if omitted)
    #[arg(long)]
    video: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum number of pairs processed in parallel
    #[arg(long)]
    workers: Option<usize>,

    /// Stem comparison used for pairing
    #[arg(long, value_enum)]
    match_mode: Option<MatchModeArg>,

    /// Keep earlier outputs instead of overwriting them
    #[arg(long)]
    rename_existing: bool,

    /// Move files without a partner into `other_files/` under the output
    #[arg(long, conflicts_with = "copy_other")]
    move_other: bool,

    /// Copy files without a partner into the output directory
    #[arg(long)]
    copy_other: bool,

    /// Convert every phone-native still, even without a video
    #[arg(long)]
    convert_all: bool,

    /// Delete source stills once their motion photo is written
    #[arg(long)]
    delete_sources: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum MatchModeArg {
    Sensitive,
    Insensitive,
}

impl From<MatchModeArg> for MatchMode {
    fn from(arg: MatchModeArg) -> Self {
        match arg {
            MatchModeArg::Sensitive => MatchMode::CaseSensitive,
            MatchModeArg::Insensitive => MatchMode::CaseInsensitive,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    init_tracing(cli.verbose, &settings.logging.level);

    let store = ExifTool::new(&settings.tools.exiftool, settings.tools.metadata_timeout());

    match cli.command {
        Commands::Mux(args) => mux(args, &settings, &store)?,
        Commands::Inspect { input, extract } => inspect(&input, extract.as_deref(), &store)?,
    }

    Ok(())
}

/// Installs the global subscriber; `RUST_LOG` wins over flags and config
fn init_tracing(verbose: u8, configured: &str) {
    let level = match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn pipeline_config(args: &MuxArgs, settings: &Settings) -> PipelineConfig {
    let file = &settings.pipeline;
    let defaults = PipelineConfig::default();

    PipelineConfig {
        output_root: args
            .output
            .clone()
            .or_else(|| file.output_root.clone())
            .unwrap_or(defaults.output_root),
        workers: args.workers.or(file.workers).unwrap_or(defaults.workers),
        match_mode: args
            .match_mode
            .map(MatchMode::from)
            .or(file.match_mode)
            .unwrap_or(defaults.match_mode),
        collision: if args.rename_existing {
            CollisionPolicy::Rename
        } else {
            file.collision.unwrap_or(defaults.collision)
        },
        move_unmatched: args.move_other || (file.move_unmatched && !args.copy_other),
        copy_unmatched: args.copy_other || file.copy_unmatched,
        convert_all: args.convert_all || file.convert_all,
        delete_sources: args.delete_sources || file.delete_sources,
    }
}

fn mux(args: MuxArgs, settings: &Settings, store: &ExifTool) -> Result<()> {
    let config = pipeline_config(&args, settings);

    match store.version() {
        Some(version) => tracing::debug!("Using exiftool {}", version),
        None => tracing::warn!(
            "{} could not be run; motion photos will be written without metadata",
            settings.tools.exiftool.display()
        ),
    }

    let converter = CommandConverter::new(
        &settings.tools.converter,
        settings.tools.converter_args.clone(),
        settings.tools.converter_timeout(),
    );
    let resolver = PairResolver::new(config.match_mode);
    let pipeline = Pipeline::new(config, store, &converter);

    let report = if let Some(dir) = &args.dir {
        println!("Scanning {}", dir.display());
        pipeline
            .run_directory(dir)
            .with_context(|| format!("Cannot process directory {}", dir.display()))?
    } else {
        let (still, video) = match (args.still, args.video) {
            (Some(still), Some(video)) => (still, video),
            (Some(still), None) => {
                let video = partner(&resolver, &still)?;
                (still, video)
            }
            (None, Some(video)) => {
                let still = partner(&resolver, &video)?;
                (still, video)
            }
            (None, None) => bail!("Either --dir or --still/--video is required"),
        };
        println!("Muxing {} + {}", still.display(), video.display());
        pipeline
            .run_pair(&still, &video)
            .context("Cannot process pair")?
    };

    print_summary(&report, &pipeline.config().output_root);
    Ok(())
}

fn partner(resolver: &PairResolver, path: &Path) -> Result<PathBuf> {
    resolver
        .partner_of(path)
        .with_context(|| format!("Cannot look up partner of {}", path.display()))?
        .with_context(|| format!("No matching still/video found for {}", path.display()))
}

fn print_summary(report: &BatchReport, output_root: &Path) {
    println!("\n=== Summary ===");
    println!("Motion photos: {}", report.processed.len());
    for processed in &report.processed {
        println!(
            "  {} (still {} bytes, video offset {})",
            processed.artifact.output_path.display(),
            processed.artifact.still_len,
            processed.metadata.video_offset
        );
    }
    if !report.unmatched.is_empty() {
        println!("Unmatched files: {}", report.unmatched.len());
    }
    if !report.moved.is_empty() {
        println!("Moved to other_files: {}", report.moved.len());
    }
    if !report.copied.is_empty() {
        println!("Copied through: {}", report.copied.len());
    }
    if !report.converted_only.is_empty() {
        println!("Converted without video: {}", report.converted_only.len());
    }
    if !report.problems.is_empty() {
        println!(
            "Problems: {} (see {})",
            report.problems.len(),
            output_root
                .join(motionmux_engine::report::PROBLEM_REPORT_FILE)
                .display()
        );
    }
}

fn inspect(input: &Path, extract: Option<&Path>, store: &dyn MetadataStore) -> Result<()> {
    let metadata = read_metadata(store, input)
        .with_context(|| format!("Failed to read metadata of {}", input.display()))?
        .with_context(|| format!("{} carries no motion photo offset", input.display()))?;

    let file_len = fs::metadata(input)
        .with_context(|| format!("Failed to stat {}", input.display()))?
        .len();
    let segment = EmbeddedSegment::locate(file_len, metadata.video_offset)
        .context("Stored offset does not fit the file")?;

    let mut file = File::open(input).context("Failed to open motion photo")?;
    let leading = segment
        .read_leading_box(&mut file)
        .context("Failed to read the embedded video header")?;

    println!("\n=== Motion Photo ===");
    println!("File size: {} bytes", file_len);
    println!("Still: {} bytes", segment.still_len());
    println!("Video: {} bytes (offset from end)", metadata.video_offset);
    println!("Format version: {}", metadata.version);
    println!(
        "Presentation timestamp: {} us",
        metadata.presentation_timestamp_us
    );
    println!(
        "Leading box: '{}' ({} bytes){}",
        leading.kind_str(),
        leading.size,
        if leading.is_leading_box() {
            ""
        } else {
            " - not a video box, offset looks wrong"
        }
    );

    if let Some(path) = extract {
        let mut writer = BufWriter::new(File::create(path).context("Failed to create output file")?);
        let copied = segment
            .extract_video(&mut file, &mut writer)
            .context("Failed to extract video")?;
        println!("Extracted {} bytes to {}", copied, path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_mux_requires_input() {
        assert!(Cli::try_parse_from(["motionmux", "mux"]).is_err());
        assert!(Cli::try_parse_from(["motionmux", "mux", "--dir", "a", "--still", "b.jpg"]).is_err());
        assert!(Cli::try_parse_from(["motionmux", "mux", "--video", "b.mov"]).is_ok());
    }

    #[test]
    fn test_flags_override_config() {
        let settings = Settings::parse(
            "[pipeline]\noutput_root = \"from_file\"\nworkers = 3\nmove_unmatched = true\n",
        )
        .unwrap();
        let cli = Cli::try_parse_from([
            "motionmux", "mux", "--dir", "in", "-o", "from_flag", "--copy-other",
        ])
        .unwrap();
        let Commands::Mux(args) = cli.command else {
            panic!("expected mux");
        };

        let config = pipeline_config(&args, &settings);
        assert_eq!(config.output_root, PathBuf::from("from_flag"));
        assert_eq!(config.workers, 3);
        assert!(config.copy_unmatched);
        assert!(!config.move_unmatched);
        assert_eq!(config.collision, CollisionPolicy::Overwrite);
    }
}
