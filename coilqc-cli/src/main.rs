#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::doc_markdown,
    clippy::uninlined_format_args,
    clippy::needless_pass_by_value,
    clippy::fn_params_excessive_bools
)]

mod confirm;
mod manifest;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use serde::Serialize;

use coilqc::segmentation::BoundedConfirmer;
use coilqc::{
    AnalysisConfig, AnalysisSession, AutoAccept, CoilRegistry, Confirmer, MaskKind, QcError,
    SegmentationEngine, SliceMasks, ThresholdPair,
};

use crate::confirm::TerminalConfirmer;
use crate::manifest::{load_image, Manifest};

/// RF coil quality control from phantom images
#[derive(Parser)]
#[command(name = "coilqc")]
#[command(about = "CoilQC CLI tools - segment phantoms and compute coil SNR and uniformity")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment, measure and report every image listed in a manifest
    Analyze {
        /// Acquisition manifest (TOML)
        #[arg(short, long)]
        manifest: PathBuf,
        /// Coil registry (TOML or JSON)
        #[arg(long)]
        coils: PathBuf,
        /// Scanner identifier in the registry
        #[arg(long)]
        scanner: String,
        /// Coil name under the scanner
        #[arg(long)]
        coil: String,
        /// Analysis settings overriding the built-in defaults (TOML)
        #[arg(long)]
        analysis_config: Option<PathBuf>,
        /// Accept every segmentation candidate without prompting
        #[arg(long)]
        auto_accept: bool,
        /// Give up after this many candidates per slice
        #[arg(long)]
        max_attempts: Option<usize>,
        /// Directory for mask preview overlays
        #[arg(long)]
        preview_dir: Option<PathBuf>,
        /// Directory for accepted/phantom/air mask images
        #[arg(long)]
        masks_dir: Option<PathBuf>,
        /// Output format (json, yaml, toml)
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
        /// Pretty print output
        #[arg(short, long)]
        pretty: bool,
        /// Write results to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Segment a single image and write its masks
    Segment {
        /// Reference image (combined-element magnitude image)
        image: PathBuf,
        /// Background seed threshold as a fraction of the maximum intensity
        #[arg(long, default_value = "0.1")]
        lower: f64,
        /// Phantom seed threshold as a fraction of the maximum intensity
        #[arg(long, default_value = "0.1")]
        upper: f64,
        /// Accept the first candidate without prompting
        #[arg(long)]
        auto_accept: bool,
        /// Directory for mask preview overlays
        #[arg(long)]
        preview_dir: Option<PathBuf>,
        /// Output directory for the mask images
        #[arg(short, long, default_value = "masks")]
        output_dir: PathBuf,
    },
    /// Print the noise scale-factor table
    ScaleFactors {
        /// Analysis settings whose table should be printed (TOML)
        #[arg(long)]
        analysis_config: Option<PathBuf>,
    },
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum OutputFormat {
    Json,
    Yaml,
    Toml,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.quiet {
        log::LevelFilter::Error
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Err(e) = run(args) {
        error!("Command failed: {:#}", e);
        process::exit(exit_code(&e));
    }
}

/// 1 for bad input or configuration, 2 for everything else
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<QcError>() {
        Some(e) if e.is_configuration_error() => 1,
        Some(
            QcError::InvalidImage(_)
            | QcError::InvalidAcquisition(_)
            | QcError::DuplicateAcquisition(_)
            | QcError::IoError(_)
            | QcError::ImageError(_),
        ) => 1,
        Some(_) => 2,
        None if err.downcast_ref::<io::Error>().is_some() => 1,
        None => 2,
    }
}

fn run(args: Args) -> Result<()> {
    let progress = !args.quiet;
    match args.command {
        Commands::Analyze {
            manifest,
            coils,
            scanner,
            coil,
            analysis_config,
            auto_accept,
            max_attempts,
            preview_dir,
            masks_dir,
            format,
            pretty,
            output,
        } => cmd_analyze(AnalyzeOptions {
            manifest,
            coils,
            scanner,
            coil,
            analysis_config,
            auto_accept,
            max_attempts,
            preview_dir,
            masks_dir,
            format,
            pretty,
            output,
            progress,
        }),
        Commands::Segment {
            image,
            lower,
            upper,
            auto_accept,
            preview_dir,
            output_dir,
        } => cmd_segment(image, ThresholdPair::new(lower, upper), auto_accept, preview_dir, output_dir),
        Commands::ScaleFactors { analysis_config } => cmd_scale_factors(analysis_config),
    }
}

struct AnalyzeOptions {
    manifest: PathBuf,
    coils: PathBuf,
    scanner: String,
    coil: String,
    analysis_config: Option<PathBuf>,
    auto_accept: bool,
    max_attempts: Option<usize>,
    preview_dir: Option<PathBuf>,
    masks_dir: Option<PathBuf>,
    format: OutputFormat,
    pretty: bool,
    output: Option<PathBuf>,
    progress: bool,
}

fn cmd_analyze(opts: AnalyzeOptions) -> Result<()> {
    let config = load_analysis_config(opts.analysis_config.as_deref())?;
    let registry = CoilRegistry::load(&opts.coils)?;
    let scanner = registry.scanner(&opts.scanner)?;
    let coil = registry.coil(&opts.scanner, &opts.coil)?;
    info!(
        "Analysing coil {} on {} ({} elements)",
        opts.coil, scanner.name, coil.element_count
    );

    let session = AnalysisSession::new(coil, config)?;

    info!("Loading manifest {}", opts.manifest.display());
    let set = Manifest::load(&opts.manifest)?.into_acquisitions(opts.progress)?;
    info!("Loaded {} images", set.len());

    let mut auto = AutoAccept;
    let mut terminal = BoundedConfirmer::new(
        TerminalConfirmer::new(io::stdin().lock(), io::stderr(), opts.preview_dir),
        opts.max_attempts.unwrap_or(usize::MAX),
    );
    let confirmer: &mut dyn Confirmer = if opts.auto_accept {
        &mut auto
    } else {
        &mut terminal
    };

    let outcome = session.run(&set, confirmer)?;

    if let Some(dir) = &opts.masks_dir {
        for (slice, masks) in &outcome.masks {
            write_masks(dir, *slice, masks)?;
        }
        info!("Masks written to {}", dir.display());
    }

    let rendered = render(&outcome, opts.format, opts.pretty)?;
    match &opts.output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Results written to {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

fn cmd_segment(
    image: PathBuf,
    thresholds: ThresholdPair,
    auto_accept: bool,
    preview_dir: Option<PathBuf>,
    output_dir: PathBuf,
) -> Result<()> {
    info!("Segmenting {}", image.display());
    let reference = load_image(&image)?;
    let mut engine = SegmentationEngine::new(thresholds, &AnalysisConfig::default())?;

    let masks = if auto_accept {
        engine.segment(&reference, &mut AutoAccept)?
    } else {
        let mut terminal = TerminalConfirmer::new(io::stdin().lock(), io::stderr(), preview_dir);
        engine.segment(&reference, &mut terminal)?
    };

    if let Err(e) = masks.validate(0) {
        warn!("{}", e);
    }
    write_masks(&output_dir, 0, &masks)?;
    info!(
        "Accepted {} with {} phantom and {} air pixels",
        masks.thresholds,
        masks.phantom.count(),
        masks.air.count()
    );
    Ok(())
}

fn cmd_scale_factors(analysis_config: Option<PathBuf>) -> Result<()> {
    let config = load_analysis_config(analysis_config.as_deref())?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{:>8}  {:>8}  {:>8}", "elements", "sd", "mean")?;
    for (elements, factor) in config.scale_factors.iter() {
        writeln!(stdout, "{:>8}  {:>8.4}  {:>8.4}", elements, factor.sd, factor.mean)?;
    }
    Ok(())
}

fn load_analysis_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    let Some(path) = path else {
        return Ok(AnalysisConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: AnalysisConfig = toml::from_str(&text)
        .map_err(|e| QcError::ConfigParse(format!("{}: {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}

fn write_masks(dir: &Path, slice: u32, masks: &SliceMasks) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    for kind in [MaskKind::Accepted, MaskKind::Phantom, MaskKind::Air] {
        let path = dir.join(format!("slice_{}_{}.png", slice, kind));
        masks.get(kind).to_luma8().save(&path)?;
    }
    Ok(())
}

fn render<T: Serialize>(value: &T, format: OutputFormat, pretty: bool) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => {
            if pretty {
                serde_json::to_string_pretty(value)?
            } else {
                serde_json::to_string(value)?
            }
        }
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
        OutputFormat::Toml => {
            if pretty {
                toml::to_string_pretty(value)?
            } else {
                toml::to_string(value)?
            }
        }
    })
}
