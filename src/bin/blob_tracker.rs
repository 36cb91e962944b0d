// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Instant;

use canonical_error::{CanonicalError, invalid_argument_error, not_found_error};
use clap::Parser;
use image::ImageReader;
use log::{debug, error, info, warn};
use tracing_appender::non_blocking::NonBlockingBuilder;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, registry, EnvFilter};

use blob_tracker::algorithm_registry::{AlgorithmRegistry, Param, ParamValues};
use blob_tracker::detector::Detector;
use blob_tracker::frame_stats::{ValueStats, ValueStatsAccumulator};
use blob_tracker::overlay::{BoxesOptions, LabelsOptions, LinesOptions, OverlayOptions,
                            StarsOptions, load_font, parse_hex_colour, render};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

// Window for the recent per-frame statistics.
const RECENT_FRAMES: usize = 100;

/// Detects bright blobs in still images and writes annotated copies.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about=None)]
struct Args {
    /// Image files, or directories whose image files are processed in name
    /// order.
    inputs: Vec<PathBuf>,

    /// Detection algorithm.
    #[arg(long, default_value = "otsu")]
    algorithm: String,

    /// Print the available algorithms and their parameters, then exit.
    #[arg(long, default_value_t = false)]
    list_algorithms: bool,

    /// Percentile algorithm sensitivity [0-100].
    #[arg(long)]
    percentile: Option<f64>,

    /// Gaussian blur kernel size (odd).
    #[arg(long)]
    blur_size: Option<u32>,

    /// Morphological cleaning kernel size (odd).
    #[arg(long)]
    clean_size: Option<u32>,

    /// Smallest accepted blob area, pixels^2.
    #[arg(long)]
    min_area: Option<f64>,

    /// Largest accepted blob area, pixels^2.
    #[arg(long)]
    max_area: Option<f64>,

    /// Threshold as a fraction of max intensity [0-1].
    #[arg(long)]
    margin: Option<f64>,

    /// Local maximum neighborhood size for the peaks algorithm (odd).
    #[arg(long)]
    peak_size: Option<u32>,

    /// Draw a star at each blob center. This is the default overlay when no
    /// overlay is selected.
    #[arg(long, default_value_t = false)]
    stars: bool,

    /// Draw bounding boxes.
    #[arg(long, default_value_t = false)]
    boxes: bool,

    /// Draw lines between nearby blobs.
    #[arg(long, default_value_t = false)]
    lines: bool,

    #[arg(long, default_value_t = 6)]
    star_size: u32,

    #[arg(long, default_value = "#FFFF00")]
    star_colour: String,

    #[arg(long, default_value = "#FFFFFF")]
    box_colour: String,

    #[arg(long, default_value_t = 1)]
    box_thickness: u32,

    #[arg(long, default_value = "#FF0000")]
    line_colour: String,

    #[arg(long, default_value_t = 1)]
    line_thickness: u32,

    /// Max number of lines meeting at a blob.
    #[arg(long, default_value_t = 2)]
    line_degree: usize,

    /// Write each blob's index and area next to its box. Needs
    /// `label_font`.
    #[arg(long, default_value_t = false)]
    labels: bool,

    /// TrueType/OpenType font file for labels.
    #[arg(long)]
    label_font: Option<PathBuf>,

    #[arg(long, default_value = "#FFFFFF")]
    label_colour: String,

    /// Label glyph height, pixels.
    #[arg(long, default_value_t = 12.0)]
    label_scale: f32,

    /// Where annotated frames are written.
    #[arg(long, default_value = "overlay")]
    output_dir: PathBuf,

    #[arg(long, default_value = ".")]
    log_dir: String,

    /// Also log to this file in `log_dir`.
    #[arg(long)]
    log_file: Option<String>,
}

fn param_values(args: &Args) -> ParamValues {
    let mut values = ParamValues::new();
    let mut set = |param, value: Option<f64>| {
        if let Some(value) = value {
            values.insert(param, value);
        }
    };
    set(Param::Percentile, args.percentile);
    set(Param::BlurSize, args.blur_size.map(f64::from));
    set(Param::CleanSize, args.clean_size.map(f64::from));
    set(Param::MinArea, args.min_area);
    set(Param::MaxArea, args.max_area);
    set(Param::Margin, args.margin);
    set(Param::PeakSize, args.peak_size.map(f64::from));
    values
}

fn overlay_options(args: &Args) -> Result<OverlayOptions, CanonicalError> {
    let draw_stars = args.stars || !(args.boxes || args.lines);
    let mut options = OverlayOptions::default();
    if draw_stars {
        options.stars = Some(StarsOptions{
            size: args.star_size,
            colour: parse_hex_colour(&args.star_colour)?,
            ..Default::default()});
    }
    if args.boxes {
        options.boxes = Some(BoxesOptions{
            colour: parse_hex_colour(&args.box_colour)?,
            thickness: args.box_thickness});
    }
    if args.lines {
        options.lines = Some(LinesOptions{
            colour: parse_hex_colour(&args.line_colour)?,
            degree: args.line_degree,
            thickness: args.line_thickness});
    }
    if args.labels {
        let Some(path) = &args.label_font else {
            return Err(invalid_argument_error("--labels needs --label-font"));
        };
        if !args.label_scale.is_finite() || args.label_scale <= 0.0 {
            return Err(invalid_argument_error(
                format!("label_scale must be positive; got {}", args.label_scale).as_str()));
        }
        options.labels = Some(LabelsOptions{
            colour: parse_hex_colour(&args.label_colour)?,
            scale: args.label_scale,
            ..LabelsOptions::new(load_font(path)?)});
    }
    Ok(options)
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

// Expands directories into their image files, sorted by name. Plain files are
// kept as given.
fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, CanonicalError> {
    let mut frames = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let entries = fs::read_dir(input).map_err(|e| invalid_argument_error(
                format!("Cannot read directory {:?}: {}", input, e).as_str()))?;
            let mut files: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file() && is_image_file(path))
                .collect();
            files.sort();
            if files.is_empty() {
                warn!("No image files in {:?}", input);
            }
            frames.extend(files);
        } else if input.is_file() {
            frames.push(input.clone());
        } else {
            return Err(not_found_error(format!("No such input {:?}", input).as_str()));
        }
    }
    Ok(frames)
}

fn output_path(output_dir: &Path, input: &Path) -> PathBuf {
    let stem = input.file_stem().map_or_else(
        || "frame".to_string(), |s| s.to_string_lossy().into_owned());
    output_dir.join(format!("{}.png", stem))
}

// Detects and annotates one frame, returning its detection count.
fn process_frame(detector: &Detector, overlay: &OverlayOptions,
                 input: &Path, output: &Path) -> Result<usize, CanonicalError> {
    let frame = ImageReader::open(input)
        .map_err(|e| not_found_error(format!("Cannot open {:?}: {}", input, e).as_str()))?
        .with_guessed_format()
        .map_err(|e| invalid_argument_error(
            format!("Cannot read {:?}: {}", input, e).as_str()))?
        .decode()
        .map_err(|e| invalid_argument_error(
            format!("Cannot decode {:?}: {}", input, e).as_str()))?;
    let result = detector.detect(&frame)?;
    let canvas = render(&frame, &result, overlay);
    canvas.save(output).map_err(|e| invalid_argument_error(
        format!("Cannot write {:?}: {}", output, e).as_str()))?;
    debug!("{:?}: {} blobs; labels {:?}", input, result.len(), result.labels());
    Ok(result.len())
}

fn log_stats(what: &str, stats: &ValueStats) {
    let session = &stats.session;
    info!("{}: min {:.2} max {:.2} mean {:.2} stddev {:.2}",
          what, session.min, session.max, session.mean, session.stddev);
    let recent = &stats.recent;
    if let (Some(median), Some(mad)) = (recent.median, recent.median_absolute_deviation) {
        info!("{}, last {} frames: median {:.2} MAD {:.2} min {:.2} max {:.2}",
              what, stats.session_count.min(RECENT_FRAMES), median, mad,
              recent.min, recent.max);
    }
}

fn list_algorithms(algorithms: &AlgorithmRegistry) {
    for config in algorithms.iter() {
        let params: Vec<&str> = config.params.iter().map(|p| p.name()).collect();
        println!("{:<12}{:<12}{}", config.key, config.name, params.join(", "));
    }
}

#[derive(Debug)]
struct RunConfig {
    detector: Detector,
    overlay: OverlayOptions,
    frames: Vec<PathBuf>,
}

// Everything that can be wrong with the command line is found here, before
// any frame is read.
fn configure(args: &Args, algorithms: &AlgorithmRegistry) -> Result<RunConfig, CanonicalError> {
    let detector = algorithms.detector(&args.algorithm, &param_values(args))?;
    let overlay = overlay_options(args)?;
    let frames = expand_inputs(&args.inputs)?;
    fs::create_dir_all(&args.output_dir).map_err(|e| invalid_argument_error(
        format!("Cannot create {:?}: {}", args.output_dir, e).as_str()))?;
    Ok(RunConfig{detector, overlay, frames})
}

fn run(args: &Args) -> Result<(), CanonicalError> {
    let algorithms = AlgorithmRegistry::new();
    if args.list_algorithms {
        list_algorithms(&algorithms);
        return Ok(());
    }
    let RunConfig{detector, overlay, frames} = configure(args, &algorithms)?;
    info!("Running {} on {} frames; writing to {:?}",
          detector.name(), frames.len(), args.output_dir);
    debug!("Detector {:?}", detector);

    let got_signal = Arc::new(AtomicBool::new(false));
    let got_signal2 = got_signal.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Got control-c");
        got_signal2.store(true, AtomicOrdering::Relaxed);
    }) {
        warn!("Could not install control-c handler: {}", e);
    }

    let mut count_stats = ValueStatsAccumulator::new(RECENT_FRAMES);
    let mut latency_stats = ValueStatsAccumulator::new(RECENT_FRAMES);
    let mut failures = 0;
    for input in &frames {
        if got_signal.load(AtomicOrdering::Relaxed) {
            info!("Stopping early");
            break;
        }
        let start = Instant::now();
        match process_frame(&detector, &overlay, input,
                            &output_path(&args.output_dir, input)) {
            Ok(count) => {
                let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                info!("{:?}: {} blobs in {:.1}ms", input, count, elapsed_ms);
                count_stats.add_value(count as f64);
                latency_stats.add_value(elapsed_ms);
            },
            Err(e) => {
                warn!("Skipping {:?}: {}", input, e.message);
                failures += 1;
            },
        }
    }

    let processed = count_stats.value_stats().session_count;
    info!("Processed {} frames, skipped {}", processed, failures);
    if processed > 0 {
        log_stats("Blobs per frame", count_stats.value_stats());
        log_stats("Milliseconds per frame", latency_stats.value_stats());
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    // Set up logging.
    let (non_blocking_stdout, stdout_guard) = NonBlockingBuilder::default()
        .lossy(false)
        .finish(std::io::stdout());
    let mut file_guard = None;
    let file_layer = args.log_file.as_ref().map(|log_file| {
        let file_appender = tracing_appender::rolling::never(&args.log_dir, log_file);
        let (non_blocking_file, guard) = NonBlockingBuilder::default()
            .lossy(false)
            .finish(file_appender);
        file_guard = Some(guard);
        fmt::layer().with_ansi(false).with_writer(non_blocking_file)
    });
    registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(non_blocking_stdout))
        .with(file_layer)
        .init();

    let exit_code = match run(&args) {
        Ok(()) => 0,
        Err(e) => {
            error!("{}", e.message);
            1
        },
    };
    // The writers flush when their guards drop; process::exit() skips that.
    drop(file_guard);
    drop(stdout_guard);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

// mod tests.
