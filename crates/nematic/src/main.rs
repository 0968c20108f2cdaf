//! nematic: classify a liquid-crystal microscope image from the command line.
//!
//! Runs the analysis pipeline on one image and prints the text report,
//! or a JSON summary with `--json`. Optionally writes the report, an
//! SVG of the detected segments, and every intermediate stage image.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin nematic -- [OPTIONS] <IMAGE_PATH>
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default
//! `info`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use nematic_export::{ReportMetadata, SvgMetadata};
use nematic_pipeline::diagnostics::{Clock, PipelineDiagnostics};
use nematic_pipeline::{
    Analysis, ClassificationConfig, ClassificationResult, Dimensions, FeatureProfile, FeatureSet,
    LineSegment,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Detect nematic-phase anomalies in a liquid-crystal microscope image.
///
/// Extracts line-like texture with Canny edges and Hough segments, then
/// applies three threshold rules to the line statistics.
#[derive(Parser)]
#[command(name = "nematic", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Gaussian smoothing kernel size (even values are bumped to odd).
    #[arg(long, default_value_t = ClassificationConfig::DEFAULT_SMOOTHING_KERNEL_SIZE)]
    smoothing_kernel_size: u32,

    /// Adaptive threshold neighbourhood size (even values are bumped to odd).
    #[arg(long, default_value_t = ClassificationConfig::DEFAULT_ADAPTIVE_BLOCK_SIZE)]
    adaptive_block_size: u32,

    /// Minimum Hough votes for a line.
    #[arg(long, default_value_t = ClassificationConfig::DEFAULT_LINE_DETECTION_THRESHOLD)]
    line_detection_threshold: u32,

    /// Minimum number of segments for a normal phase.
    #[arg(long, default_value_t = ClassificationConfig::DEFAULT_MIN_LINES)]
    min_lines: usize,

    /// Maximum angle variance (degrees squared) for a normal phase.
    #[arg(long, default_value_t = ClassificationConfig::DEFAULT_MAX_ANGLE_VARIANCE)]
    max_angle_variance: f64,

    /// Minimum mean segment length (pixels) for a normal phase.
    #[arg(long, default_value_t = ClassificationConfig::DEFAULT_MIN_AVG_LENGTH)]
    min_avg_length: f64,

    /// Full classification config as a JSON string.
    ///
    /// Overrides `--config` and the individual parameter flags. Missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Read the classification config from a JSON file.
    ///
    /// Overrides the individual parameter flags.
    #[arg(long, conflicts_with = "config_json")]
    config: Option<PathBuf>,

    /// Print a JSON summary instead of the text report.
    #[arg(long)]
    json: bool,

    /// Write the text report to this file.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write an SVG of the detected segments to this file.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Write grayscale, smoothed, binary, edge, and overlay PNGs here.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Print per-stage timings and metrics to stderr.
    #[arg(long)]
    diagnostics: bool,
}

/// Machine-readable result printed by `--json`.
#[derive(Serialize)]
struct Summary<'a> {
    image: String,
    dimensions: Dimensions,
    features: FeatureSet,
    profile: FeatureProfile,
    classification: &'a ClassificationResult,
    lines: &'a [LineSegment],
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<&'a PipelineDiagnostics>,
}

/// Build a [`ClassificationConfig`] from CLI arguments.
///
/// `--config-json` wins over `--config`, which wins over the
/// individual flags.
fn config_from_cli(cli: &Cli) -> Result<ClassificationConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    if let Some(ref path) = cli.config {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        return serde_json::from_str(&text)
            .map_err(|e| format!("Error parsing {}: {e}", path.display()));
    }

    Ok(ClassificationConfig {
        smoothing_kernel_size: cli.smoothing_kernel_size,
        adaptive_block_size: cli.adaptive_block_size,
        line_detection_threshold: cli.line_detection_threshold,
        min_lines: cli.min_lines,
        max_angle_variance: cli.max_angle_variance,
        min_avg_length: cli.min_avg_length,
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = config_from_cli(cli)?;
    let image_bytes = std::fs::read(&cli.image_path)
        .map_err(|e| format!("Error reading {}: {e}", cli.image_path.display()))?;

    tracing::info!(
        image = %cli.image_path.display(),
        bytes = image_bytes.len(),
        "analyzing image"
    );
    tracing::debug!(?config, "classification config");

    let (analysis, diagnostics) = nematic_pipeline::diagnostics::process_staged_with_diagnostics(
        &image_bytes,
        &config,
        &StdClock,
    )
    .map_err(|e| format!("Pipeline error: {e}"))?;

    if cli.diagnostics {
        eprintln!("{}", diagnostics.report());
    }

    let image_name = cli
        .image_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let config_json =
        serde_json::to_string(&config).map_err(|e| format!("Error serializing config: {e}"))?;
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

    let report = nematic_export::to_report(
        &analysis.features,
        &analysis.classification,
        &timestamp,
        &ReportMetadata {
            source: Some(image_name),
            config_json: Some(&config_json),
        },
    );

    if cli.json {
        let summary = Summary {
            image: image_name.to_owned(),
            dimensions: analysis.dimensions,
            features: analysis.features.rounded(),
            profile: analysis.features.profile(),
            classification: &analysis.classification,
            lines: &analysis.lines,
            diagnostics: cli.diagnostics.then_some(&diagnostics),
        };
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| format!("Error serializing summary: {e}"))?;
        println!("{json}");
    } else {
        println!("{report}");
    }

    if let Some(ref path) = cli.report {
        write_file(path, report.as_bytes())?;
    }

    if let Some(ref path) = cli.svg {
        let description = format!(
            "{} ({}% confidence) at {timestamp}",
            analysis.classification.phase, analysis.classification.confidence
        );
        let svg = nematic_export::to_svg(
            &analysis.lines,
            analysis.dimensions,
            &SvgMetadata {
                title: Some(image_name),
                description: Some(&description),
                config_json: Some(&config_json),
            },
        );
        write_file(path, svg.as_bytes())?;
    }

    if let Some(ref dir) = cli.out_dir {
        let stem = cli
            .image_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image");
        write_stage_images(dir, stem, &analysis)?;
    }

    Ok(())
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), String> {
    std::fs::write(path, contents)
        .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = contents.len(), "wrote file");
    Ok(())
}

/// Save every intermediate raster as `<stem>_<stage>.png` in `dir`.
fn write_stage_images(dir: &Path, stem: &str, analysis: &Analysis) -> Result<(), String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("Error creating {}: {e}", dir.display()))?;

    let gray_stages = [
        ("grayscale", &analysis.grayscale),
        ("smoothed", &analysis.smoothed),
        ("binary", &analysis.binary),
        ("edges", &analysis.edges),
    ];
    for (stage, image) in gray_stages {
        let path = dir.join(format!("{stem}_{stage}.png"));
        image
            .save(&path)
            .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
        tracing::debug!(path = %path.display(), "wrote stage image");
    }

    let path = dir.join(format!("{stem}_overlay.png"));
    analysis
        .overlay()
        .save(&path)
        .map_err(|e| format!("Error writing {}: {e}", path.display()))?;

    tracing::info!(dir = %dir.display(), "wrote stage images");
    Ok(())
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_default_to_config_defaults() {
        let cli = Cli::try_parse_from(["nematic", "sample.png"]).unwrap();
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config, ClassificationConfig::default());
    }

    #[test]
    fn individual_flags_are_applied() {
        let cli = Cli::try_parse_from([
            "nematic",
            "sample.png",
            "--min-lines",
            "3",
            "--max-angle-variance",
            "42.5",
        ])
        .unwrap();
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.min_lines, 3);
        assert!((config.max_angle_variance - 42.5).abs() < f64::EPSILON);
        assert_eq!(
            config.adaptive_block_size,
            ClassificationConfig::DEFAULT_ADAPTIVE_BLOCK_SIZE
        );
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = Cli::try_parse_from([
            "nematic",
            "sample.png",
            "--min-lines",
            "3",
            "--config-json",
            r#"{"min_lines": 7}"#,
        ])
        .unwrap();
        assert_eq!(config_from_cli(&cli).unwrap().min_lines, 7);
    }

    #[test]
    fn bad_config_json_is_reported() {
        let cli =
            Cli::try_parse_from(["nematic", "sample.png", "--config-json", "{not json"]).unwrap();
        let err = config_from_cli(&cli).unwrap_err();
        assert!(err.starts_with("Error parsing --config-json"), "{err}");
    }

    #[test]
    fn config_and_config_json_conflict() {
        let parsed = Cli::try_parse_from([
            "nematic",
            "sample.png",
            "--config",
            "a.json",
            "--config-json",
            "{}",
        ]);
        assert!(parsed.is_err());
    }
}
