//! Aggregate geometric statistics over detected line segments.

use serde::{Deserialize, Serialize};

use crate::types::LineSegment;

/// Aggregate statistics of one set of line segments.
///
/// Every field is zero for an empty set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureSet {
    /// Number of segments.
    pub line_count: usize,
    /// Arithmetic mean of segment lengths, in pixels.
    pub avg_length: f64,
    /// Population variance of segment angles, in degrees squared.
    ///
    /// Angles live in `[0, 360)` and are treated as plain numbers, so
    /// two nearly parallel segments pointing in opposite directions
    /// (e.g. 1 and 359 degrees) contribute a large variance.
    pub angle_variance: f64,
}

impl FeatureSet {
    /// Copy with `avg_length` and `angle_variance` rounded to two
    /// decimal places, for display.
    #[must_use]
    pub fn rounded(self) -> Self {
        Self {
            line_count: self.line_count,
            avg_length: round2(self.avg_length),
            angle_variance: round2(self.angle_variance),
        }
    }

    /// Normalized axes for a radar-style summary chart.
    #[must_use]
    pub fn profile(&self) -> FeatureProfile {
        #[allow(clippy::cast_precision_loss)]
        let count = self.line_count as f64;
        FeatureProfile {
            line_count: count.min(20.0),
            avg_length: self.avg_length.min(50.0),
            alignment: 100.0 - (self.angle_variance / 5.0).min(100.0),
            density: (count * 5.0).min(100.0),
        }
    }
}

/// Four bounded chart axes derived from a [`FeatureSet`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureProfile {
    /// Line count capped at 20.
    pub line_count: f64,
    /// Mean length capped at 50 pixels.
    pub avg_length: f64,
    /// `100 - min(angle_variance / 5, 100)`; higher means better aligned.
    pub alignment: f64,
    /// `min(line_count * 5, 100)`.
    pub density: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compute count, mean length, and angular variance of `lines`.
#[must_use]
pub fn analyze_lines(lines: &[LineSegment]) -> FeatureSet {
    if lines.is_empty() {
        return FeatureSet::default();
    }

    #[allow(clippy::cast_precision_loss)]
    let n = lines.len() as f64;
    let avg_length = lines.iter().map(|l| l.length()).sum::<f64>() / n;

    let angles: Vec<f64> = lines.iter().map(|l| l.angle()).collect();
    let mean_angle = angles.iter().sum::<f64>() / n;
    let angle_variance = angles
        .iter()
        .map(|a| (a - mean_angle).powi(2))
        .sum::<f64>()
        / n;

    FeatureSet {
        line_count: lines.len(),
        avg_length,
        angle_variance,
    }
}
