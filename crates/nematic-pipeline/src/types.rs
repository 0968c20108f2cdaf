//! Shared types for the nematic analysis pipeline.

use serde::{Deserialize, Serialize};

use crate::classify::ClassificationResult;
use crate::features::FeatureSet;

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage` so downstream crates can reference the
/// original decoded image without depending on `image` directly.
pub use image::RgbaImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total number of pixels (`width * height`).
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Returns `true` if either axis is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A straight line segment between two pixel positions.
///
/// Produced by [`crate::lines::extract_segments`]. The endpoints are
/// integer pixel coordinates with the origin at the top-left corner and
/// the y axis pointing down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineSegment {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
}

impl LineSegment {
    /// Create a segment from `(x1, y1)` to `(x2, y2)`.
    #[must_use]
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// The first endpoint `(x1, y1)`.
    #[must_use]
    pub const fn start(self) -> (i32, i32) {
        (self.x1, self.y1)
    }

    /// The second endpoint `(x2, y2)`.
    #[must_use]
    pub const fn end(self) -> (i32, i32) {
        (self.x2, self.y2)
    }

    fn delta(self) -> (f64, f64) {
        (
            f64::from(self.x2) - f64::from(self.x1),
            f64::from(self.y2) - f64::from(self.y1),
        )
    }

    /// Euclidean length in pixels.
    #[must_use]
    pub fn length(self) -> f64 {
        let (dx, dy) = self.delta();
        dx.hypot(dy)
    }

    /// Direction from start to end in degrees, normalized to `[0, 360)`.
    ///
    /// Computed as `atan2(dy, dx)` and shifted with `(angle + 360) % 360`.
    /// A zero-length segment has angle `0`.
    #[must_use]
    pub fn angle(self) -> f64 {
        let (dx, dy) = self.delta();
        let degrees = dy.atan2(dx).to_degrees();
        (degrees + 360.0) % 360.0
    }
}

/// Result of running the pipeline with every intermediate stage output
/// preserved.
///
/// Each raster field is a fresh image allocated by its stage; no stage
/// rewrites the output of an earlier one.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Stage 1: decoded RGBA source image.
    pub original: RgbaImage,
    /// Stage 2a: luma conversion of the source.
    pub grayscale: GrayImage,
    /// Stage 2b: Gaussian-smoothed grayscale.
    pub smoothed: GrayImage,
    /// Stage 3: adaptive-threshold binary mask (0 or 255).
    pub binary: GrayImage,
    /// Stage 4: Canny edge map (0 or 255).
    pub edges: GrayImage,
    /// Stage 5: detected line segments, in detection order.
    pub lines: Vec<LineSegment>,
    /// Stage 6: aggregate line statistics.
    pub features: FeatureSet,
    /// Stage 7: rule-based classification.
    pub classification: ClassificationResult,
    /// Source image dimensions in pixels.
    pub dimensions: Dimensions,
}

impl Analysis {
    /// Render the detected segments in red over the binary mask.
    #[must_use]
    pub fn overlay(&self) -> RgbaImage {
        crate::overlay::draw_segments(&self.binary, &self.lines)
    }
}

/// Errors that can occur during pipeline processing.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The image or a configuration value is unusable. Raised before
    /// any stage runs.
    #[error("invalid input `{parameter}`: {reason}")]
    InvalidInput {
        /// Name of the offending image property or config field.
        parameter: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A stage could not produce its output. The run is aborted and no
    /// partial result is returned.
    #[error("stage `{stage}` failed: {reason}")]
    StageFailure {
        /// Name of the failing stage.
        stage: &'static str,
        /// Why it failed.
        reason: String,
    },
}

impl PipelineError {
    pub(crate) fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            parameter,
            reason: reason.into(),
        }
    }
}
