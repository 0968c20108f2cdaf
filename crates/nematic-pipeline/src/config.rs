//! Per-run analysis configuration.
//!
//! [`ClassificationConfig`] bundles the preprocessing parameters and the
//! classification thresholds into one immutable value that is passed to
//! the pipeline entry point. Nothing in the pipeline reads configuration
//! from anywhere else.

use serde::{Deserialize, Serialize};

use crate::types::PipelineError;

/// Round an even size up to the next odd value. Odd sizes pass through.
#[must_use]
pub const fn next_odd(size: u32) -> u32 {
    if size % 2 == 0 { size + 1 } else { size }
}

/// Preprocessing parameters and classification thresholds for one run.
///
/// Deserialization fills missing fields from [`Default`], so a partial
/// JSON document such as `{"min_lines": 4}` is accepted.
///
/// Call [`validate`](Self::validate) (the pipeline does this before the
/// first stage) to reject unusable values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Side length of the square Gaussian smoothing kernel. Even values
    /// are incremented to the next odd value; `1` disables smoothing.
    /// At most [`MAX_SMOOTHING_KERNEL_SIZE`](Self::MAX_SMOOTHING_KERNEL_SIZE).
    pub smoothing_kernel_size: u32,

    /// Side length of the adaptive threshold neighbourhood. Even values
    /// are incremented to the next odd value; the result must be at
    /// least [`MIN_ADAPTIVE_BLOCK_SIZE`](Self::MIN_ADAPTIVE_BLOCK_SIZE).
    pub adaptive_block_size: u32,

    /// Minimum Hough accumulator votes for a candidate line.
    pub line_detection_threshold: u32,

    /// Fewer detected lines than this fails the line-count rule. Must be
    /// at least `1`, so an image without lines is always an anomaly.
    pub min_lines: usize,

    /// An angle variance (degrees squared) above this fails the
    /// alignment rule. Must be positive.
    pub max_angle_variance: f64,

    /// A mean segment length (pixels) below this fails the length rule.
    /// Must be positive.
    pub min_avg_length: f64,
}

impl ClassificationConfig {
    /// Default smoothing kernel size.
    pub const DEFAULT_SMOOTHING_KERNEL_SIZE: u32 = 5;
    /// Default adaptive threshold block size.
    pub const DEFAULT_ADAPTIVE_BLOCK_SIZE: u32 = 11;
    /// Default Hough vote threshold.
    pub const DEFAULT_LINE_DETECTION_THRESHOLD: u32 = 50;
    /// Default minimum line count.
    pub const DEFAULT_MIN_LINES: usize = 10;
    /// Default maximum angle variance.
    pub const DEFAULT_MAX_ANGLE_VARIANCE: f64 = 20.0;
    /// Default minimum mean line length.
    pub const DEFAULT_MIN_AVG_LENGTH: f64 = 15.0;

    /// Smallest usable adaptive block size after odd normalization.
    pub const MIN_ADAPTIVE_BLOCK_SIZE: u32 = 3;

    /// Largest accepted smoothing kernel size.
    pub const MAX_SMOOTHING_KERNEL_SIZE: u32 = 255;

    /// Smoothing kernel size after odd normalization.
    #[must_use]
    pub const fn normalized_kernel_size(&self) -> u32 {
        next_odd(self.smoothing_kernel_size)
    }

    /// Adaptive block size after odd normalization.
    #[must_use]
    pub const fn normalized_block_size(&self) -> u32 {
        next_odd(self.adaptive_block_size)
    }

    /// Check every field, naming the first offending one.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] if any size, count or
    /// threshold is zero, if the smoothing kernel exceeds
    /// [`MAX_SMOOTHING_KERNEL_SIZE`](Self::MAX_SMOOTHING_KERNEL_SIZE), if
    /// the normalized block size is below
    /// [`MIN_ADAPTIVE_BLOCK_SIZE`](Self::MIN_ADAPTIVE_BLOCK_SIZE), or if a
    /// floating-point threshold is not a finite positive number.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.smoothing_kernel_size == 0 {
            return Err(PipelineError::invalid(
                "smoothing_kernel_size",
                "must be a positive integer",
            ));
        }
        if self.normalized_kernel_size() > Self::MAX_SMOOTHING_KERNEL_SIZE {
            return Err(PipelineError::invalid(
                "smoothing_kernel_size",
                format!(
                    "must be at most {} after odd normalization, got {}",
                    Self::MAX_SMOOTHING_KERNEL_SIZE,
                    self.normalized_kernel_size(),
                ),
            ));
        }
        if self.adaptive_block_size == 0 {
            return Err(PipelineError::invalid(
                "adaptive_block_size",
                "must be a positive integer",
            ));
        }
        if self.normalized_block_size() < Self::MIN_ADAPTIVE_BLOCK_SIZE {
            return Err(PipelineError::invalid(
                "adaptive_block_size",
                format!(
                    "must be at least {} after odd normalization, got {}",
                    Self::MIN_ADAPTIVE_BLOCK_SIZE,
                    self.normalized_block_size(),
                ),
            ));
        }
        if self.line_detection_threshold == 0 {
            return Err(PipelineError::invalid(
                "line_detection_threshold",
                "must be a positive integer",
            ));
        }
        if self.min_lines == 0 {
            return Err(PipelineError::invalid(
                "min_lines",
                "must be a positive integer",
            ));
        }
        check_threshold("max_angle_variance", self.max_angle_variance)?;
        check_threshold("min_avg_length", self.min_avg_length)?;
        Ok(())
    }
}

fn check_threshold(parameter: &'static str, value: f64) -> Result<(), PipelineError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PipelineError::invalid(
            parameter,
            format!("must be a finite, positive number, got {value}"),
        ))
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            smoothing_kernel_size: Self::DEFAULT_SMOOTHING_KERNEL_SIZE,
            adaptive_block_size: Self::DEFAULT_ADAPTIVE_BLOCK_SIZE,
            line_detection_threshold: Self::DEFAULT_LINE_DETECTION_THRESHOLD,
            min_lines: Self::DEFAULT_MIN_LINES,
            max_angle_variance: Self::DEFAULT_MAX_ANGLE_VARIANCE,
            min_avg_length: Self::DEFAULT_MIN_AVG_LENGTH,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ClassificationConfig::default().validate().is_ok());
    }

    #[test]
    fn even_sizes_round_up_to_odd() {
        let config = ClassificationConfig {
            smoothing_kernel_size: 4,
            adaptive_block_size: 6,
            ..ClassificationConfig::default()
        };
        assert_eq!(config.normalized_kernel_size(), 5);
        assert_eq!(config.normalized_block_size(), 7);
    }

    #[test]
    fn odd_sizes_unchanged() {
        assert_eq!(next_odd(1), 1);
        assert_eq!(next_odd(7), 7);
        assert_eq!(next_odd(u32::MAX), u32::MAX);
    }

    fn invalid_parameter(config: &ClassificationConfig) -> &'static str {
        match config.validate() {
            Err(PipelineError::InvalidInput { parameter, .. }) => parameter,
            other => unreachable!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn zero_kernel_size_rejected() {
        let config = ClassificationConfig {
            smoothing_kernel_size: 0,
            ..ClassificationConfig::default()
        };
        assert_eq!(invalid_parameter(&config), "smoothing_kernel_size");
    }

    #[test]
    fn block_size_one_rejected() {
        let config = ClassificationConfig {
            adaptive_block_size: 1,
            ..ClassificationConfig::default()
        };
        assert_eq!(invalid_parameter(&config), "adaptive_block_size");
    }

    #[test]
    fn block_size_two_normalizes_to_three() {
        let config = ClassificationConfig {
            adaptive_block_size: 2,
            ..ClassificationConfig::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.normalized_block_size(), 3);
    }

    #[test]
    fn zero_vote_threshold_rejected() {
        let config = ClassificationConfig {
            line_detection_threshold: 0,
            ..ClassificationConfig::default()
        };
        assert_eq!(invalid_parameter(&config), "line_detection_threshold");
    }

    #[test]
    fn negative_or_nan_thresholds_rejected() {
        let negative = ClassificationConfig {
            max_angle_variance: -1.0,
            ..ClassificationConfig::default()
        };
        assert_eq!(invalid_parameter(&negative), "max_angle_variance");

        let nan = ClassificationConfig {
            min_avg_length: f64::NAN,
            ..ClassificationConfig::default()
        };
        assert_eq!(invalid_parameter(&nan), "min_avg_length");
    }

    #[test]
    fn zero_min_lines_rejected() {
        let config = ClassificationConfig {
            min_lines: 0,
            ..ClassificationConfig::default()
        };
        assert_eq!(invalid_parameter(&config), "min_lines");
    }

    #[test]
    fn zero_float_thresholds_rejected() {
        let variance = ClassificationConfig {
            max_angle_variance: 0.0,
            ..ClassificationConfig::default()
        };
        assert_eq!(invalid_parameter(&variance), "max_angle_variance");

        let length = ClassificationConfig {
            min_avg_length: 0.0,
            ..ClassificationConfig::default()
        };
        assert_eq!(invalid_parameter(&length), "min_avg_length");
    }

    #[test]
    fn oversized_kernel_rejected() {
        let config = ClassificationConfig {
            smoothing_kernel_size: ClassificationConfig::MAX_SMOOTHING_KERNEL_SIZE + 1,
            ..ClassificationConfig::default()
        };
        assert_eq!(invalid_parameter(&config), "smoothing_kernel_size");

        let huge = ClassificationConfig {
            smoothing_kernel_size: u32::MAX,
            ..ClassificationConfig::default()
        };
        assert_eq!(invalid_parameter(&huge), "smoothing_kernel_size");
    }

    #[test]
    fn largest_kernel_accepted() {
        let config = ClassificationConfig {
            smoothing_kernel_size: ClassificationConfig::MAX_SMOOTHING_KERNEL_SIZE,
            ..ClassificationConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ClassificationConfig = serde_json::from_str(r#"{"min_lines": 4}"#).unwrap();
        assert_eq!(config.min_lines, 4);
        assert_eq!(
            config.adaptive_block_size,
            ClassificationConfig::DEFAULT_ADAPTIVE_BLOCK_SIZE
        );
    }

    #[test]
    fn json_round_trip() {
        let config = ClassificationConfig {
            smoothing_kernel_size: 7,
            max_angle_variance: 42.5,
            ..ClassificationConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ClassificationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
