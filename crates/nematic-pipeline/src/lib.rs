//! nematic-pipeline: Pure image analysis pipeline (sans-IO).
//!
//! Classifies a liquid-crystal microscope image as normal or anomalous
//! from its line-like texture:
//! decode -> grayscale -> smoothing -> adaptive threshold -> Canny ->
//! Hough segments -> line statistics -> threshold rules.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices or decoded images and returns structured data. Report
//! rendering lives in `nematic-export`, background scheduling in
//! `nematic-worker`.

pub mod blur;
pub mod classify;
pub mod config;
pub mod diagnostics;
pub mod edge;
pub mod features;
pub mod grayscale;
pub mod lines;
pub mod overlay;
pub mod pipeline;
pub mod threshold;
pub mod types;

pub use classify::{ClassificationResult, Phase, RuleChecks};
pub use config::ClassificationConfig;
pub use features::{FeatureProfile, FeatureSet};
pub use pipeline::Pipeline;
pub use types::{Analysis, Dimensions, GrayImage, LineSegment, PipelineError, RgbaImage};

/// Run the full pipeline on encoded image bytes, preserving every
/// intermediate.
///
/// The config is validated before the image is decoded.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidInput`] for an invalid config or a
/// zero-dimension image, [`PipelineError::EmptyInput`] if `image_bytes`
/// is empty, [`PipelineError::ImageDecode`] if the bytes are not a
/// supported image, and [`PipelineError::StageFailure`] if a stage
/// cannot produce output.
pub fn process_staged(
    image_bytes: &[u8],
    config: &ClassificationConfig,
) -> Result<Analysis, PipelineError> {
    Pipeline::new(image_bytes.to_vec(), config.clone())
        .decode()?
        .preprocess()
        .binarize()
        .detect_edges()
        .extract_lines()
        .map(|lines| lines.analyze().classify().into_result())
}

/// Run the full pipeline on an already decoded image.
///
/// Reprocessing with a new config calls this again with the same
/// source; nothing is cached between runs.
///
/// # Errors
///
/// Same as [`process_staged`], minus the decoding errors.
pub fn analyze_image(
    image: &RgbaImage,
    config: &ClassificationConfig,
) -> Result<Analysis, PipelineError> {
    Pipeline::from_image(image.clone(), config.clone())?
        .preprocess()
        .binarize()
        .detect_edges()
        .extract_lines()
        .map(|lines| lines.analyze().classify().into_result())
}

/// Run the full pipeline and return only the classification.
///
/// # Errors
///
/// Same as [`process_staged`].
pub fn process(
    image_bytes: &[u8],
    config: &ClassificationConfig,
) -> Result<ClassificationResult, PipelineError> {
    process_staged(image_bytes, config).map(|analysis| analysis.classification)
}
