//! Rule-based phase classification.
//!
//! Three independent threshold checks run in a fixed order: line count,
//! angle variance, mean length. A sample is [`Phase::Normal`] only if
//! all three pass. Confidence is the share of passing checks as a
//! rounded percentage.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ClassificationConfig;
use crate::features::FeatureSet;

/// Number of rule checks contributing to the confidence score.
pub const CHECK_COUNT: u8 = 3;

/// Classification label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Every rule check passed.
    Normal,
    /// At least one rule check failed.
    Anomaly,
}

impl Phase {
    /// Upper-case label as shown in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Anomaly => "ANOMALY",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pass/fail outcome of each rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct RuleChecks {
    /// `line_count >= min_lines`.
    pub line_count: bool,
    /// `angle_variance <= max_angle_variance`.
    pub angle_variance: bool,
    /// `avg_length >= min_avg_length`.
    pub avg_length: bool,
}

impl RuleChecks {
    /// Number of passing checks.
    #[must_use]
    pub fn passed(self) -> u8 {
        [self.line_count, self.angle_variance, self.avg_length]
            .into_iter()
            .map(u8::from)
            .sum()
    }

    /// Returns `true` if every check passed.
    #[must_use]
    pub const fn all_passed(self) -> bool {
        self.line_count && self.angle_variance && self.avg_length
    }
}

/// Outcome of [`classify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Phase label.
    pub phase: Phase,
    /// One human-readable message per failed check, in check order.
    pub reasons: Vec<String>,
    /// `round(100 * passed / 3)`: one of 0, 33, 67, 100.
    pub confidence: u8,
    /// Individual check outcomes.
    pub checks: RuleChecks,
}

/// Apply the threshold rules in `config` to `features`.
#[must_use]
pub fn classify(features: &FeatureSet, config: &ClassificationConfig) -> ClassificationResult {
    let checks = RuleChecks {
        line_count: features.line_count >= config.min_lines,
        angle_variance: features.angle_variance <= config.max_angle_variance,
        avg_length: features.avg_length >= config.min_avg_length,
    };

    let mut reasons = Vec::new();
    if !checks.line_count {
        reasons.push(format!(
            "Lines detected ({}) is less than minimum ({})",
            features.line_count, config.min_lines,
        ));
    }
    if !checks.angle_variance {
        reasons.push(format!(
            "Angle variance ({:.1}) exceeds maximum ({})",
            features.angle_variance, config.max_angle_variance,
        ));
    }
    if !checks.avg_length {
        reasons.push(format!(
            "Average line length ({:.1}px) is less than minimum ({}px)",
            features.avg_length, config.min_avg_length,
        ));
    }

    let phase = if checks.all_passed() {
        Phase::Normal
    } else {
        Phase::Anomaly
    };

    ClassificationResult {
        phase,
        reasons,
        confidence: confidence(checks.passed()),
        checks,
    }
}

/// Rounded percentage of `passed` out of [`CHECK_COUNT`].
#[allow(clippy::cast_possible_truncation)]
const fn confidence(passed: u8) -> u8 {
    // Integer round-half-up of 100 * passed / 3.
    let total = CHECK_COUNT as u16;
    ((passed as u16 * 200 + total) / (2 * total)) as u8
}
