//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! The pipeline crate has no time source of its own. Callers that want
//! per-stage durations pass a [`Clock`] to
//! [`process_staged_with_diagnostics`]; the CLI uses one backed by
//! [`std::time::Instant`], tests use a fake.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::Phase;
use crate::config::ClassificationConfig;
use crate::pipeline::{Pipeline, PipelineStage};
use crate::types::{Analysis, PipelineError};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Monotonic time source injected by the caller.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: image decoding.
    pub decode: StageDiagnostics,
    /// Stage 2: grayscale conversion and smoothing.
    pub preprocess: StageDiagnostics,
    /// Stage 3: adaptive thresholding.
    pub binarize: StageDiagnostics,
    /// Stage 4: Canny edge detection.
    pub edge_detection: StageDiagnostics,
    /// Stage 5: Hough line extraction.
    pub line_extraction: StageDiagnostics,
    /// Stage 6: feature aggregation.
    pub features: StageDiagnostics,
    /// Stage 7: rule-based classification.
    pub classification: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Image decoding metrics.
    Decode {
        /// Size of the input image bytes, `None` for a pre-decoded image.
        input_bytes: Option<usize>,
        /// Decoded image width in pixels.
        width: u32,
        /// Decoded image height in pixels.
        height: u32,
        /// Total pixel count (`width * height`).
        pixel_count: u64,
    },
    /// Grayscale conversion and smoothing metrics.
    Preprocess {
        /// Smoothing kernel size after odd normalization.
        kernel_size: u32,
        /// Sigma derived from the kernel size.
        sigma: f32,
    },
    /// Adaptive threshold metrics.
    Binarize {
        /// Block size after odd normalization.
        block_size: u32,
        /// Number of foreground (255) pixels.
        foreground_pixel_count: u64,
        /// Total pixel count.
        total_pixel_count: u64,
    },
    /// Canny edge detection metrics.
    EdgeDetection {
        /// Low hysteresis threshold.
        low_threshold: f32,
        /// High hysteresis threshold.
        high_threshold: f32,
        /// Number of edge pixels (value == 255) in the output.
        edge_pixel_count: u64,
        /// Total pixel count for computing edge density.
        total_pixel_count: u64,
    },
    /// Line extraction metrics.
    LineExtraction {
        /// Hough vote threshold.
        vote_threshold: u32,
        /// Number of accepted segments.
        segment_count: usize,
    },
    /// Feature aggregation metrics.
    Features {
        /// Number of segments.
        line_count: usize,
        /// Mean segment length.
        avg_length: f64,
        /// Angle variance.
        angle_variance: f64,
    },
    /// Classification metrics.
    Classification {
        /// Assigned phase.
        phase: Phase,
        /// Confidence percentage.
        confidence: u8,
        /// Number of failed checks.
        failed_checks: usize,
    },
}

/// High-level summary for the entire pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Number of detected segments.
    pub line_count: usize,
    /// Assigned phase.
    pub phase: Phase,
}

/// Run the pipeline stage by stage, timing each transition with `clock`.
///
/// # Errors
///
/// Returns any [`PipelineError`] the pipeline itself would return.
pub fn process_staged_with_diagnostics<C: Clock>(
    image_bytes: &[u8],
    config: &ClassificationConfig,
    clock: &C,
) -> Result<(Analysis, PipelineDiagnostics), PipelineError> {
    let total_start = clock.now();

    let start = clock.now();
    let decoded = Pipeline::new(image_bytes.to_vec(), config.clone()).decode()?;
    let decode = timed(clock, &start, &decoded)?;

    let start = clock.now();
    let preprocessed = decoded.preprocess();
    let preprocess = timed(clock, &start, &preprocessed)?;

    let start = clock.now();
    let binarized = preprocessed.binarize();
    let binarize = timed(clock, &start, &binarized)?;

    let start = clock.now();
    let edges = binarized.detect_edges();
    let edge_detection = timed(clock, &start, &edges)?;

    let start = clock.now();
    let lines = edges.extract_lines()?;
    let line_extraction = timed(clock, &start, &lines)?;

    let start = clock.now();
    let analyzed = lines.analyze();
    let features = timed(clock, &start, &analyzed)?;

    let start = clock.now();
    let classified = analyzed.classify();
    let classification = timed(clock, &start, &classified)?;

    let total_duration = clock.elapsed(&total_start);
    let analysis = classified.into_result();

    let diagnostics = PipelineDiagnostics {
        decode,
        preprocess,
        binarize,
        edge_detection,
        line_extraction,
        features,
        classification,
        total_duration,
        summary: PipelineSummary {
            image_width: analysis.dimensions.width,
            image_height: analysis.dimensions.height,
            pixel_count: analysis.dimensions.pixel_count(),
            line_count: analysis.lines.len(),
            phase: analysis.classification.phase,
        },
    };
    Ok((analysis, diagnostics))
}

/// Pair the elapsed time since `start` with the stage's metrics.
fn timed<C: Clock, S: PipelineStage>(
    clock: &C,
    start: &C::Instant,
    stage: &S,
) -> Result<StageDiagnostics, PipelineError> {
    let duration = clock.elapsed(start);
    let metrics = stage.metrics().ok_or_else(|| PipelineError::StageFailure {
        stage: S::NAME,
        reason: "stage reported no metrics".to_owned(),
    })?;
    Ok(StageDiagnostics { duration, metrics })
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Decode", &self.decode),
            ("Preprocess", &self.preprocess),
            ("Binarize", &self.binarize),
            ("Edge Detection", &self.edge_detection),
            ("Line Extraction", &self.line_extraction),
            ("Features", &self.features),
            ("Classification", &self.classification),
        ];

        for (name, diag) in stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Lines: {}  |  Phase: {}",
            self.summary.line_count, self.summary.phase,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
            ..
        } => match input_bytes {
            Some(bytes) => format!("{bytes} bytes -> {width}x{height}"),
            None => format!("pre-decoded {width}x{height}"),
        },
        StageMetrics::Preprocess { kernel_size, sigma } => {
            format!("kernel={kernel_size} sigma={sigma:.2}")
        }
        StageMetrics::Binarize {
            block_size,
            foreground_pixel_count,
            total_pixel_count,
        } => {
            let pct = percentage(*foreground_pixel_count, *total_pixel_count);
            format!("block={block_size} foreground={foreground_pixel_count} ({pct:.1}%)")
        }
        StageMetrics::EdgeDetection {
            low_threshold,
            high_threshold,
            edge_pixel_count,
            total_pixel_count,
        } => {
            let density = percentage(*edge_pixel_count, *total_pixel_count);
            format!(
                "low={low_threshold:.1} high={high_threshold:.1} edges={edge_pixel_count} ({density:.1}%)",
            )
        }
        StageMetrics::LineExtraction {
            vote_threshold,
            segment_count,
        } => format!("votes>={vote_threshold} segments={segment_count}"),
        StageMetrics::Features {
            line_count,
            avg_length,
            angle_variance,
        } => format!("n={line_count} mean_len={avg_length:.2} var={angle_variance:.2}"),
        StageMetrics::Classification {
            phase,
            confidence,
            failed_checks,
        } => format!("{phase} confidence={confidence}% failed={failed_checks}"),
    }
}

#[allow(clippy::cast_precision_loss)]
fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        part as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

/// Count pixels with value 255 in a grayscale image.
pub(crate) fn count_edge_pixels(image: &image::GrayImage) -> u64 {
    image
        .pixels()
        .map(|p| u64::from(u8::from(p.0[0] == 255)))
        .sum()
}
