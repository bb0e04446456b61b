use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, Level};
use wentral::config::{parse_extra, Overrides};
use wentral::slicing::slice_boxes;
use wentral::{
    evaluate, make_detector, AppConfig, DetectParams, Detection, DetectorKind, JsonDataset,
    WentralError,
};

/// Benchmarking tool for web page object detectors
#[derive(Parser, Debug)]
#[command(name = "wentral", author, version, about)]
struct Cli {
    /// Increase the amount of debug output
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate a detector on a labeled dataset
    #[command(alias = "bm")]
    Benchmark(BenchmarkArgs),
    /// Run a detector on images and print the detections as JSON
    Detect(DetectArgs),
    /// Print the slice boxes for an image size
    Slices(SlicesArgs),
}

/// Detector selection, shared by the commands that run one
#[derive(Args, Debug)]
struct DetectorArgs {
    /// Configuration file (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Detector to use: json or static
    #[arg(short, long)]
    detector: Option<DetectorKind>,

    /// Data file of the detector
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// Minimum confidence of a detection to be counted
    #[arg(short, long, value_name = "X")]
    confidence_threshold: Option<f32>,

    /// IoU above which two detections are considered the same
    #[arg(long, value_name = "X")]
    iou_threshold: Option<f32>,

    /// Extra detector parameter (repeatable)
    #[arg(short = 'x', long = "extra", value_name = "NAME=VALUE", value_parser = parse_extra)]
    extra: Vec<(String, String)>,

    /// Slice tall and wide images before detection
    #[arg(long)]
    slicing: bool,

    /// Aspect ratio below which images are sliced
    #[arg(long, value_name = "X")]
    slicing_threshold: Option<f64>,

    /// Fraction of a slice shared with the next one
    #[arg(long, value_name = "X")]
    slice_overlap: Option<f64>,
}

impl DetectorArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            detector: self.detector,
            path: self.path.clone(),
            confidence_threshold: self.confidence_threshold,
            iou_threshold: self.iou_threshold,
            match_iou: None,
            extra: self.extra.clone(),
            slicing: self.slicing,
            slicing_threshold: self.slicing_threshold,
            slice_overlap: self.slice_overlap,
        }
    }

    /// Configuration file (or defaults) with the command line applied
    fn load_config(&self, overrides: Overrides) -> anyhow::Result<AppConfig> {
        let config = match &self.config {
            Some(path) => AppConfig::from_toml_file(path)?,
            None => AppConfig::default(),
        };

        let config = config.with_overrides(&overrides);
        config.validate()?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
struct BenchmarkArgs {
    /// JSON file with the labeled dataset
    #[arg(value_name = "DATASET")]
    dataset: PathBuf,

    #[command(flatten)]
    detector: DetectorArgs,

    /// Minimum IoU after which the detection is considered correct
    #[arg(short, long, value_name = "X")]
    match_iou: Option<f32>,

    /// Output file for the evaluation in JSON format
    #[arg(short, long, value_name = "JSON_FILE")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct DetectArgs {
    /// Images to run the detector on
    #[arg(value_name = "IMAGE", required = true)]
    images: Vec<PathBuf>,

    #[command(flatten)]
    detector: DetectorArgs,
}

#[derive(Args, Debug)]
struct SlicesArgs {
    /// Image size as WIDTHxHEIGHT
    #[arg(value_name = "WIDTHxHEIGHT")]
    size: String,

    /// Configuration file (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Aspect ratio below which images are sliced
    #[arg(long, value_name = "X")]
    slicing_threshold: Option<f64>,

    /// Fraction of a slice shared with the next one
    #[arg(long, value_name = "X")]
    slice_overlap: Option<f64>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_image_size(size: &str) -> Result<(u32, u32), WentralError> {
    let invalid = || WentralError::InvalidImageSize(size.to_string());
    let (width, height) = size.split_once(['x', 'X']).ok_or_else(invalid)?;

    Ok((
        width.trim().parse().map_err(|_| invalid())?,
        height.trim().parse().map_err(|_| invalid())?,
    ))
}

fn detect_params(config: &AppConfig) -> DetectParams {
    DetectParams {
        extra: config.detector.extra.clone(),
        ..DetectParams::default()
    }
}

fn run_benchmark(args: BenchmarkArgs, verbose: u8) -> anyhow::Result<()> {
    let mut overrides = args.detector.overrides();
    overrides.match_iou = args.match_iou;
    let mut config = args.detector.load_config(overrides)?;

    // The static detector reads the ground truth of the benchmarked dataset
    // unless told otherwise.
    if config.detector.kind == DetectorKind::Static && config.detector.path.is_none() {
        config.detector.path = Some(args.dataset.clone());
    }

    let dataset = JsonDataset::from_file(&args.dataset)
        .with_context(|| format!("Failed to load dataset {}", args.dataset.display()))?;
    let detector = make_detector(&config)?;

    let evaluation = evaluate(
        &dataset,
        detector.as_ref(),
        detect_params(&config),
        config.benchmark.confidence_threshold,
        config.benchmark.match_iou,
    )?;

    if args.output.is_none() || verbose > 0 {
        println!("{}", evaluation);
    }

    if let Some(output) = &args.output {
        evaluation.to_json_file(output)?;
    }

    Ok(())
}

fn run_detect(args: DetectArgs) -> anyhow::Result<()> {
    let config = args.detector.load_config(args.detector.overrides())?;
    let detector = make_detector(&config)?;

    let images = args
        .images
        .iter()
        .map(|path| {
            let image = image::open(path)
                .map_err(|e| WentralError::ImageLoadError(path.clone(), e))?;
            Ok((image, path.to_string_lossy().into_owned()))
        })
        .collect::<Result<Vec<_>, WentralError>>()?;
    info!("Loaded {} images", images.len());

    let results: BTreeMap<String, Vec<Detection>> = detector
        .batch_detect(&images, &detect_params(&config))?
        .into_iter()
        .collect();

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

fn run_slices(args: SlicesArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => AppConfig::from_toml_file(path)?,
        None => AppConfig::default(),
    };
    let config = config.with_overrides(&Overrides {
        slicing_threshold: args.slicing_threshold,
        slice_overlap: args.slice_overlap,
        ..Overrides::default()
    });
    config.validate()?;

    let size = parse_image_size(&args.size)?;
    for slice in slice_boxes(
        size,
        config.slicing.slicing_threshold,
        config.slicing.slice_overlap,
    ) {
        println!("{}", serde_json::to_string(&slice)?);
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Benchmark(args) => run_benchmark(args, cli.verbose),
        Commands::Detect(args) => run_detect(args),
        Commands::Slices(args) => run_slices(args),
    }
}
