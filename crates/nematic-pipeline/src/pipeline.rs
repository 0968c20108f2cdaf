//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::process_staged`] which runs the entire pipeline in one
//! call, [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use nematic_pipeline::{ClassificationConfig, Pipeline, PipelineError};
//! # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
//! let config = ClassificationConfig::default();
//! let classified = Pipeline::new(png, config)
//!     .decode()?
//!     .preprocess()
//!     .binarize()
//!     .detect_edges()
//!     .extract_lines()?
//!     .analyze()
//!     .classify();
//!
//! println!("{}", classified.classification().phase);
//! let analysis = classified.into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state
//! (or `Result` for fallible stages), carrying all previously computed
//! intermediates. The configuration is validated when the pipeline
//! leaves [`Pending`], before any pixel is touched.

use crate::classify::ClassificationResult;
use crate::config::ClassificationConfig;
use crate::diagnostics::StageMetrics;
use crate::features::FeatureSet;
use crate::types::{Analysis, Dimensions, GrayImage, LineSegment, PipelineError, RgbaImage};

fn dimensions_of(image: &RgbaImage) -> Dimensions {
    Dimensions {
        width: image.width(),
        height: image.height(),
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// The source image bytes and config are stored but not yet touched.
/// Call [`decode`](Self::decode) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .decode() to continue"]
pub struct Pending {
    config: ClassificationConfig,
    source: Vec<u8>,
}

impl Pending {
    /// The raw source image bytes.
    #[must_use]
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Validate the config, decode the source image, and advance to the
    /// [`Decoded`] stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] if the config is invalid
    /// or the image has a zero dimension, [`PipelineError::EmptyInput`]
    /// if the source bytes are empty, and [`PipelineError::ImageDecode`]
    /// if the image format is unrecognized or the data is corrupt.
    pub fn decode(self) -> Result<Decoded, PipelineError> {
        self.config.validate()?;
        let source_len = self.source.len();
        let original = crate::grayscale::decode(&self.source)?;
        let dimensions = dimensions_of(&original);
        tracing::debug!(
            bytes = source_len,
            width = dimensions.width,
            height = dimensions.height,
            "decoded source image",
        );
        Ok(Decoded {
            config: self.config,
            original,
            source_len: Some(source_len),
            dimensions,
        })
    }
}

// ───────────────────────── Stage 1: Decoded ──────────────────────────

/// Pipeline state after decoding the source image.
///
/// Call [`preprocess`](Self::preprocess) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .preprocess() to continue"]
pub struct Decoded {
    config: ClassificationConfig,
    original: RgbaImage,
    source_len: Option<usize>,
    dimensions: Dimensions,
}

impl Decoded {
    /// The original decoded RGBA image.
    #[must_use]
    pub const fn original(&self) -> &RgbaImage {
        &self.original
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Convert to grayscale, smooth, and advance to [`Preprocessed`].
    pub fn preprocess(self) -> Preprocessed {
        let kernel_size = self.config.normalized_kernel_size();
        let grayscale = crate::grayscale::to_grayscale(&self.original);
        let smoothed = crate::blur::gaussian_smooth(&grayscale, kernel_size);
        tracing::debug!(kernel_size, "preprocessed image");
        Preprocessed {
            config: self.config,
            original: self.original,
            grayscale,
            smoothed,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage 2: Preprocessed ─────────────────────

/// Pipeline state after grayscale conversion and smoothing.
///
/// Call [`binarize`](Self::binarize) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .binarize() to continue"]
pub struct Preprocessed {
    config: ClassificationConfig,
    original: RgbaImage,
    grayscale: GrayImage,
    smoothed: GrayImage,
    dimensions: Dimensions,
}

impl Preprocessed {
    /// The luma image.
    #[must_use]
    pub const fn grayscale(&self) -> &GrayImage {
        &self.grayscale
    }

    /// The Gaussian-smoothed luma image.
    #[must_use]
    pub const fn smoothed(&self) -> &GrayImage {
        &self.smoothed
    }

    /// Apply the adaptive mean threshold and advance to [`Binarized`].
    pub fn binarize(self) -> Binarized {
        let block_size = self.config.normalized_block_size();
        let binary = crate::threshold::adaptive_mean_threshold(&self.smoothed, block_size);
        tracing::debug!(block_size, "binarized image");
        Binarized {
            config: self.config,
            original: self.original,
            grayscale: self.grayscale,
            smoothed: self.smoothed,
            binary,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage 3: Binarized ────────────────────────

/// Pipeline state after adaptive thresholding.
///
/// Call [`detect_edges`](Self::detect_edges) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .detect_edges() to continue"]
pub struct Binarized {
    config: ClassificationConfig,
    original: RgbaImage,
    grayscale: GrayImage,
    smoothed: GrayImage,
    binary: GrayImage,
    dimensions: Dimensions,
}

impl Binarized {
    /// The binary mask (0 or 255).
    #[must_use]
    pub const fn binary(&self) -> &GrayImage {
        &self.binary
    }

    /// Run Canny edge detection and advance to [`EdgesDetected`].
    pub fn detect_edges(self) -> EdgesDetected {
        let edges = crate::edge::canny(&self.binary);
        tracing::debug!(
            edge_pixels = crate::diagnostics::count_edge_pixels(&edges),
            "detected edges",
        );
        EdgesDetected {
            config: self.config,
            original: self.original,
            grayscale: self.grayscale,
            smoothed: self.smoothed,
            binary: self.binary,
            edges,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage 4: EdgesDetected ────────────────────

/// Pipeline state after edge detection.
///
/// Call [`extract_lines`](Self::extract_lines) to advance to the next
/// stage.
#[must_use = "pipeline stages are consumed by advancing; call .extract_lines() to continue"]
pub struct EdgesDetected {
    config: ClassificationConfig,
    original: RgbaImage,
    grayscale: GrayImage,
    smoothed: GrayImage,
    binary: GrayImage,
    edges: GrayImage,
    dimensions: Dimensions,
}

impl EdgesDetected {
    /// The binary edge map.
    #[must_use]
    pub const fn edges(&self) -> &GrayImage {
        &self.edges
    }

    /// Extract line segments and advance to [`LinesExtracted`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::StageFailure`] if the image is too large
    /// for the Hough accumulator.
    pub fn extract_lines(self) -> Result<LinesExtracted, PipelineError> {
        let lines =
            crate::lines::extract_segments(&self.edges, self.config.line_detection_threshold)?;
        Ok(LinesExtracted {
            config: self.config,
            original: self.original,
            grayscale: self.grayscale,
            smoothed: self.smoothed,
            binary: self.binary,
            edges: self.edges,
            lines,
            dimensions: self.dimensions,
        })
    }
}

// ───────────────────────── Stage 5: LinesExtracted ───────────────────

/// Pipeline state after line segment extraction.
///
/// Call [`analyze`](Self::analyze) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .analyze() to continue"]
pub struct LinesExtracted {
    config: ClassificationConfig,
    original: RgbaImage,
    grayscale: GrayImage,
    smoothed: GrayImage,
    binary: GrayImage,
    edges: GrayImage,
    lines: Vec<LineSegment>,
    dimensions: Dimensions,
}

impl LinesExtracted {
    /// The detected line segments, in detection order.
    #[must_use]
    pub fn lines(&self) -> &[LineSegment] {
        &self.lines
    }

    /// Compute aggregate line features and advance to [`Analyzed`].
    pub fn analyze(self) -> Analyzed {
        let features = crate::features::analyze_lines(&self.lines);
        tracing::debug!(
            line_count = features.line_count,
            avg_length = features.avg_length,
            angle_variance = features.angle_variance,
            "analyzed line features",
        );
        Analyzed {
            config: self.config,
            original: self.original,
            grayscale: self.grayscale,
            smoothed: self.smoothed,
            binary: self.binary,
            edges: self.edges,
            lines: self.lines,
            features,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage 6: Analyzed ─────────────────────────

/// Pipeline state after feature aggregation.
///
/// Call [`classify`](Self::classify) to advance to the final stage.
#[must_use = "pipeline stages are consumed by advancing; call .classify() to continue"]
pub struct Analyzed {
    config: ClassificationConfig,
    original: RgbaImage,
    grayscale: GrayImage,
    smoothed: GrayImage,
    binary: GrayImage,
    edges: GrayImage,
    lines: Vec<LineSegment>,
    features: FeatureSet,
    dimensions: Dimensions,
}

impl Analyzed {
    /// The aggregate line features.
    #[must_use]
    pub const fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// Apply the classification rules and advance to [`Classified`].
    pub fn classify(self) -> Classified {
        let classification = crate::classify::classify(&self.features, &self.config);
        tracing::info!(
            phase = %classification.phase,
            confidence = classification.confidence,
            lines = self.features.line_count,
            "classified sample",
        );
        Classified {
            config: self.config,
            original: self.original,
            grayscale: self.grayscale,
            smoothed: self.smoothed,
            binary: self.binary,
            edges: self.edges,
            lines: self.lines,
            features: self.features,
            classification,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage 7: Classified ───────────────────────

/// Pipeline state after classification, the final stage.
///
/// Call [`into_result`](Self::into_result) to extract the [`Analysis`]
/// containing all intermediates.
#[must_use = "call .into_result() to extract the Analysis"]
pub struct Classified {
    config: ClassificationConfig,
    original: RgbaImage,
    grayscale: GrayImage,
    smoothed: GrayImage,
    binary: GrayImage,
    edges: GrayImage,
    lines: Vec<LineSegment>,
    features: FeatureSet,
    classification: ClassificationResult,
    dimensions: Dimensions,
}

impl Classified {
    /// The classification outcome.
    #[must_use]
    pub const fn classification(&self) -> &ClassificationResult {
        &self.classification
    }

    /// The configuration this run used.
    #[must_use]
    pub const fn config(&self) -> &ClassificationConfig {
        &self.config
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Consume the pipeline and return the full [`Analysis`].
    #[must_use]
    pub fn into_result(self) -> Analysis {
        Analysis {
            original: self.original,
            grayscale: self.grayscale,
            smoothed: self.smoothed,
            binary: self.binary,
            edges: self.edges,
            lines: self.lines,
            features: self.features,
            classification: self.classification,
            dimensions: self.dimensions,
        }
    }
}

// ──────────────────── PipelineStage trait + Stage enum ────────────────

/// Total number of stages in the pipeline.
pub const STAGE_COUNT: usize = 8;

/// The output produced by a single pipeline stage.
///
/// Each variant borrows the data that the corresponding stage computed.
#[must_use]
pub enum StageOutput<'a> {
    /// Source image bytes (not yet decoded).
    Source {
        /// The raw image bytes.
        bytes: &'a [u8],
    },
    /// Decoded RGBA image.
    Decoded {
        /// The original image.
        original: &'a RgbaImage,
    },
    /// Grayscale and smoothed images.
    Preprocessed {
        /// The luma image.
        grayscale: &'a GrayImage,
        /// The smoothed luma image.
        smoothed: &'a GrayImage,
    },
    /// Adaptive threshold result.
    Binarized {
        /// The binary mask.
        binary: &'a GrayImage,
    },
    /// Edge detection result.
    EdgesDetected {
        /// The binary edge map.
        edges: &'a GrayImage,
    },
    /// Line extraction result.
    LinesExtracted {
        /// The detected segments.
        lines: &'a [LineSegment],
    },
    /// Feature aggregation result.
    Analyzed {
        /// The aggregate features.
        features: &'a FeatureSet,
    },
    /// Classification result.
    Classified {
        /// The classification outcome.
        classification: &'a ClassificationResult,
    },
}

/// Trait implemented by every pipeline stage, enabling uniform iteration.
///
/// Each stage struct implements it, and [`Stage`] delegates to whichever
/// variant it holds.
pub trait PipelineStage: Sized {
    /// Human-readable name of this stage (e.g. `"source"`, `"lines"`).
    const NAME: &str;

    /// Zero-based index of this stage (`0` for Pending through `7` for
    /// Classified).
    const INDEX: usize;

    /// The output this stage produced.
    fn output(&self) -> StageOutput<'_>;

    /// Stage-specific metrics for diagnostics, `None` for [`Pending`].
    fn metrics(&self) -> Option<StageMetrics>;

    /// Advance to the next stage.
    ///
    /// Returns `Ok(Some(stage))` on success or `Ok(None)` if already at
    /// the final stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the stage transition fails.
    fn next(self) -> Result<Option<Stage>, PipelineError>;

    /// Run all remaining stages to completion.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining fallible stage fails.
    fn complete(self) -> Result<Analysis, PipelineError>;
}

impl PipelineStage for Pending {
    const NAME: &str = "source";
    const INDEX: usize = 0;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Source {
            bytes: &self.source,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Decoded(self.decode()?)))
    }

    fn complete(self) -> Result<Analysis, PipelineError> {
        self.decode()?.complete()
    }
}

impl PipelineStage for Decoded {
    const NAME: &str = "decode";
    const INDEX: usize = 1;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Decoded {
            original: &self.original,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Decode {
            input_bytes: self.source_len,
            width: self.dimensions.width,
            height: self.dimensions.height,
            pixel_count: self.dimensions.pixel_count(),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Preprocessed(self.preprocess())))
    }

    fn complete(self) -> Result<Analysis, PipelineError> {
        self.preprocess().complete()
    }
}

impl PipelineStage for Preprocessed {
    const NAME: &str = "preprocess";
    const INDEX: usize = 2;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Preprocessed {
            grayscale: &self.grayscale,
            smoothed: &self.smoothed,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        let kernel_size = self.config.normalized_kernel_size();
        Some(StageMetrics::Preprocess {
            kernel_size,
            sigma: crate::blur::sigma_for_kernel_size(kernel_size),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Binarized(self.binarize())))
    }

    fn complete(self) -> Result<Analysis, PipelineError> {
        self.binarize().complete()
    }
}

impl PipelineStage for Binarized {
    const NAME: &str = "binarize";
    const INDEX: usize = 3;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Binarized {
            binary: &self.binary,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Binarize {
            block_size: self.config.normalized_block_size(),
            foreground_pixel_count: crate::diagnostics::count_edge_pixels(&self.binary),
            total_pixel_count: self.dimensions.pixel_count(),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::EdgesDetected(self.detect_edges())))
    }

    fn complete(self) -> Result<Analysis, PipelineError> {
        self.detect_edges().complete()
    }
}

impl PipelineStage for EdgesDetected {
    const NAME: &str = "edges";
    const INDEX: usize = 4;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::EdgesDetected {
            edges: &self.edges,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::EdgeDetection {
            low_threshold: crate::edge::CANNY_LOW_THRESHOLD,
            high_threshold: crate::edge::CANNY_HIGH_THRESHOLD,
            edge_pixel_count: crate::diagnostics::count_edge_pixels(&self.edges),
            total_pixel_count: self.dimensions.pixel_count(),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::LinesExtracted(self.extract_lines()?)))
    }

    fn complete(self) -> Result<Analysis, PipelineError> {
        self.extract_lines()?.complete()
    }
}

impl PipelineStage for LinesExtracted {
    const NAME: &str = "lines";
    const INDEX: usize = 5;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::LinesExtracted { lines: &self.lines }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::LineExtraction {
            vote_threshold: self.config.line_detection_threshold,
            segment_count: self.lines.len(),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Analyzed(self.analyze())))
    }

    fn complete(self) -> Result<Analysis, PipelineError> {
        self.analyze().complete()
    }
}

impl PipelineStage for Analyzed {
    const NAME: &str = "features";
    const INDEX: usize = 6;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Analyzed {
            features: &self.features,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Features {
            line_count: self.features.line_count,
            avg_length: self.features.avg_length,
            angle_variance: self.features.angle_variance,
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Classified(self.classify())))
    }

    fn complete(self) -> Result<Analysis, PipelineError> {
        self.classify().complete()
    }
}

impl PipelineStage for Classified {
    const NAME: &str = "classify";
    const INDEX: usize = 7;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Classified {
            classification: &self.classification,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Classification {
            phase: self.classification.phase,
            confidence: self.classification.confidence,
            failed_checks: self.classification.reasons.len(),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(None)
    }

    fn complete(self) -> Result<Analysis, PipelineError> {
        Ok(self.into_result())
    }
}

/// Enum wrapping all pipeline stages for uniform, loopable access.
///
/// ```rust
/// # use nematic_pipeline::{ClassificationConfig, Pipeline, PipelineError};
/// # use nematic_pipeline::pipeline::{Advance, Stage};
/// # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
/// let mut stage: Stage = Pipeline::new(png, ClassificationConfig::default()).into();
/// loop {
///     match stage.advance()? {
///         Advance::Next(next) => stage = next,
///         Advance::Complete(done) => { stage = done; break; }
///     }
/// }
/// let analysis = stage.complete()?;
/// # Ok(())
/// # }
/// ```
#[must_use]
pub enum Stage {
    /// See [`Pending`].
    Pending(Pending),
    /// See [`Decoded`].
    Decoded(Decoded),
    /// See [`Preprocessed`].
    Preprocessed(Preprocessed),
    /// See [`Binarized`].
    Binarized(Binarized),
    /// See [`EdgesDetected`].
    EdgesDetected(EdgesDetected),
    /// See [`LinesExtracted`].
    LinesExtracted(LinesExtracted),
    /// See [`Analyzed`].
    Analyzed(Analyzed),
    /// See [`Classified`].
    Classified(Classified),
}

/// Compile-time guard: adding a [`Stage`] variant makes this match
/// non-exhaustive, a reminder to bump [`STAGE_COUNT`].
#[allow(dead_code, clippy::match_same_arms)]
const fn _stage_count_guard(s: &Stage) {
    match s {
        Stage::Pending(_)
        | Stage::Decoded(_)
        | Stage::Preprocessed(_)
        | Stage::Binarized(_)
        | Stage::EdgesDetected(_)
        | Stage::LinesExtracted(_)
        | Stage::Analyzed(_)
        | Stage::Classified(_) => {}
    }
}

/// Result of [`Stage::advance`]: either the next stage or the
/// completed final stage returned unchanged.
#[must_use]
pub enum Advance {
    /// The pipeline advanced to this next stage.
    Next(Stage),
    /// The pipeline was already at the final stage.
    Complete(Stage),
}

/// Delegate a method call to whichever `Stage` variant is active.
macro_rules! delegate {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            Self::Pending(s) => s.$method($($arg),*),
            Self::Decoded(s) => s.$method($($arg),*),
            Self::Preprocessed(s) => s.$method($($arg),*),
            Self::Binarized(s) => s.$method($($arg),*),
            Self::EdgesDetected(s) => s.$method($($arg),*),
            Self::LinesExtracted(s) => s.$method($($arg),*),
            Self::Analyzed(s) => s.$method($($arg),*),
            Self::Classified(s) => s.$method($($arg),*),
        }
    };
}

impl Stage {
    /// Human-readable name of the current stage.
    #[must_use]
    pub fn name(&self) -> &'static str {
        delegate!(self, name)
    }

    /// Zero-based index of the current stage.
    #[must_use]
    pub fn index(&self) -> usize {
        delegate!(self, index)
    }

    /// The output this stage produced.
    pub fn output(&self) -> StageOutput<'_> {
        delegate!(self, output)
    }

    /// Stage-specific metrics for diagnostics.
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        delegate!(self, metrics)
    }

    /// Whether the pipeline is at the final stage.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Classified(_))
    }

    /// Advance to the next stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn next(self) -> Result<Option<Self>, PipelineError> {
        delegate!(self, next)
    }

    /// Advance to the next stage, returning `self` unchanged if
    /// already complete.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn advance(self) -> Result<Advance, PipelineError> {
        if self.is_complete() {
            return Ok(Advance::Complete(self));
        }
        match self.next()? {
            Some(next) => Ok(Advance::Next(next)),
            None => Err(PipelineError::StageFailure {
                stage: "advance",
                reason: "non-final stage produced no successor".to_owned(),
            }),
        }
    }

    /// Run all remaining stages to completion.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining fallible stage fails.
    pub fn complete(self) -> Result<Analysis, PipelineError> {
        delegate!(self, complete)
    }
}

// The trait's associated constants are not callable as `self.NAME`, so
// the macro goes through this blanket helper.
trait StageMetadata {
    fn name(&self) -> &'static str;
    fn index(&self) -> usize;
}

impl<T: PipelineStage> StageMetadata for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn index(&self) -> usize {
        T::INDEX
    }
}

macro_rules! stage_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Stage {
                fn from(s: $variant) -> Self {
                    Self::$variant(s)
                }
            }
        )*
    };
}

stage_from!(
    Pending,
    Decoded,
    Preprocessed,
    Binarized,
    EdgesDetected,
    LinesExtracted,
    Analyzed,
    Classified,
);

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental analysis pipeline.
///
/// Each stage method consumes the current state and returns the next,
/// making it a compile-time error to skip stages or call them out of
/// order.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline from source image bytes and config.
    ///
    /// No processing is performed; call [`.decode()`](Pending::decode)
    /// to begin.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(image_bytes: Vec<u8>, config: ClassificationConfig) -> Pending {
        Pending {
            config,
            source: image_bytes,
        }
    }

    /// Start a pipeline from an already decoded image, skipping the
    /// loader.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] if the config is invalid
    /// or the image has a zero dimension.
    pub fn from_image(
        image: RgbaImage,
        config: ClassificationConfig,
    ) -> Result<Decoded, PipelineError> {
        config.validate()?;
        crate::grayscale::check_dimensions(&image)?;
        let dimensions = dimensions_of(&image);
        Ok(Decoded {
            config,
            original: image,
            source_len: None,
            dimensions,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::classify::Phase;

    /// Vertical black/white stripes, `period` pixels per stripe.
    fn striped_image(width: u32, height: u32, period: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, _y| {
            if (x / period) % 2 == 0 {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        })
    }

    fn encode_png(img: &RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn typed_chain_produces_analysis() {
        let png = encode_png(&striped_image(64, 64, 8));
        let analysis = Pipeline::new(png, ClassificationConfig::default())
            .decode()
            .unwrap()
            .preprocess()
            .binarize()
            .detect_edges()
            .extract_lines()
            .unwrap()
            .analyze()
            .classify()
            .into_result();
        assert_eq!(analysis.dimensions.width, 64);
        assert_eq!(analysis.binary.dimensions(), (64, 64));
        assert_eq!(analysis.features.line_count, analysis.lines.len());
    }

    #[test]
    fn invalid_config_rejected_before_decode() {
        let config = ClassificationConfig {
            adaptive_block_size: 1,
            ..ClassificationConfig::default()
        };
        // Empty bytes would be EmptyInput, but the config is checked first.
        let result = Pipeline::new(Vec::new(), config).decode();
        assert!(matches!(
            result,
            Err(PipelineError::InvalidInput {
                parameter: "adaptive_block_size",
                ..
            })
        ));
    }

    #[test]
    fn empty_bytes_rejected() {
        let result = Pipeline::new(Vec::new(), ClassificationConfig::default()).decode();
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn from_image_rejects_zero_dimension() {
        let result = Pipeline::from_image(RgbaImage::new(0, 10), ClassificationConfig::default());
        assert!(matches!(result, Err(PipelineError::InvalidInput { .. })));
    }

    #[test]
    fn from_image_matches_decoded_bytes() {
        let img = striped_image(48, 40, 6);
        let config = ClassificationConfig::default();
        let from_bytes = Pipeline::new(encode_png(&img), config.clone())
            .decode()
            .unwrap()
            .complete()
            .unwrap();
        let from_image = Pipeline::from_image(img, config)
            .unwrap()
            .complete()
            .unwrap();
        assert_eq!(from_bytes.lines, from_image.lines);
        assert_eq!(from_bytes.classification, from_image.classification);
    }

    #[test]
    fn stage_loop_visits_every_stage_in_order() {
        let png = encode_png(&striped_image(32, 32, 4));
        let mut stage: Stage = Pipeline::new(png, ClassificationConfig::default()).into();
        let mut names = vec![stage.name()];
        loop {
            match stage.advance().unwrap() {
                Advance::Next(next) => {
                    assert_eq!(next.index(), names.len());
                    assert!(next.metrics().is_some());
                    names.push(next.name());
                    stage = next;
                }
                Advance::Complete(done) => {
                    stage = done;
                    break;
                }
            }
        }
        assert_eq!(names.len(), STAGE_COUNT);
        assert_eq!(
            names,
            [
                "source",
                "decode",
                "preprocess",
                "binarize",
                "edges",
                "lines",
                "features",
                "classify"
            ]
        );
        assert!(stage.is_complete());
        assert!(stage.complete().is_ok());
    }

    #[test]
    fn uniform_image_classified_as_anomaly() {
        let img = RgbaImage::from_pixel(40, 40, image::Rgba([128, 128, 128, 255]));
        let analysis = Pipeline::from_image(img, ClassificationConfig::default())
            .unwrap()
            .complete()
            .unwrap();
        assert!(analysis.lines.is_empty());
        assert_eq!(analysis.classification.phase, Phase::Anomaly);
        assert!(analysis.edges.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn decode_metrics_report_source_length() {
        let png = encode_png(&striped_image(16, 16, 4));
        let len = png.len();
        let decoded = Pipeline::new(png, ClassificationConfig::default())
            .decode()
            .unwrap();
        assert!(matches!(
            decoded.metrics(),
            Some(StageMetrics::Decode { input_bytes: Some(n), .. }) if n == len
        ));

        let direct =
            Pipeline::from_image(striped_image(16, 16, 4), ClassificationConfig::default())
                .unwrap();
        assert!(matches!(
            direct.metrics(),
            Some(StageMetrics::Decode {
                input_bytes: None,
                ..
            })
        ));
    }

    #[test]
    fn pending_has_no_metrics() {
        let stage: Stage = Pipeline::new(vec![1, 2, 3], ClassificationConfig::default()).into();
        assert!(stage.metrics().is_none());
        assert!(matches!(stage.output(), StageOutput::Source { bytes } if bytes.len() == 3));
    }
}
