//! Plain-text report serializer.
//!
//! Produces a short `Key: value` document summarizing one analysis:
//!
//! ```text
//! LC Nematic Phase Detection Report
//! ===================================
//! Date: 2026-01-01 12:00:00
//! Prediction: NORMAL
//! Lines Detected: 15
//! Average Line Length: 25.3 px
//! Angle Variance: 12.0
//! Confidence: 100%
//! Reasons: All criteria satisfied
//! -----------------------------------
//! Generated by LC Nematic Phase Detector
//! ```
//!
//! The timestamp is supplied by the caller so the serializer stays pure.
//! Mean length is shown rounded to two decimals, variance to one.

use std::fmt::Write;

use nematic_pipeline::{ClassificationResult, FeatureSet};

/// Report heading.
pub const TITLE: &str = "LC Nematic Phase Detection Report";

/// Closing line.
pub const FOOTER: &str = "Generated by LC Nematic Phase Detector";

/// Width of the banner and footer rules.
const RULE_WIDTH: usize = 35;

/// Optional extra lines for the report header.
#[derive(Debug, Clone, Default)]
pub struct ReportMetadata<'a> {
    /// Source image name, emitted as `Source: <name>` after the date.
    pub source: Option<&'a str>,

    /// Serialized configuration, emitted as `Config: <json>` before
    /// the footer.
    pub config_json: Option<&'a str>,
}

/// Render the text report for one analysis.
#[must_use]
pub fn to_report(
    features: &FeatureSet,
    classification: &ClassificationResult,
    timestamp: &str,
    metadata: &ReportMetadata<'_>,
) -> String {
    let shown = features.rounded();
    let mut out = String::new();

    let _ = writeln!(out, "{TITLE}");
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
    let _ = writeln!(out, "Date: {timestamp}");
    if let Some(source) = metadata.source {
        let _ = writeln!(out, "Source: {source}");
    }
    let _ = writeln!(out, "Prediction: {}", classification.phase);
    let _ = writeln!(out, "Lines Detected: {}", shown.line_count);
    let _ = writeln!(out, "Average Line Length: {} px", shown.avg_length);
    let _ = writeln!(out, "Angle Variance: {:.1}", features.angle_variance);
    let _ = writeln!(out, "Confidence: {}%", classification.confidence);

    if classification.reasons.is_empty() {
        let _ = writeln!(out, "Reasons: All criteria satisfied");
    } else {
        let _ = writeln!(out, "Reasons:");
        for reason in &classification.reasons {
            let _ = writeln!(out, "  - {reason}");
        }
    }

    if let Some(config_json) = metadata.config_json {
        let _ = writeln!(out, "Config: {config_json}");
    }
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
    let _ = write!(out, "{FOOTER}");
    out
}

#[cfg(test)]
mod tests {
    use nematic_pipeline::classify::classify;
    use nematic_pipeline::{ClassificationConfig, Phase};

    use super::*;

    fn normal() -> (FeatureSet, ClassificationResult) {
        let features = FeatureSet {
            line_count: 15,
            avg_length: 25.3,
            angle_variance: 12.0,
        };
        let result = classify(&features, &ClassificationConfig::default());
        (features, result)
    }

    #[test]
    fn normal_report_layout() {
        let (features, result) = normal();
        assert_eq!(result.phase, Phase::Normal);
        let report = to_report(
            &features,
            &result,
            "2026-01-01 12:00:00",
            &ReportMetadata::default(),
        );
        let expected = "\
LC Nematic Phase Detection Report
===================================
Date: 2026-01-01 12:00:00
Prediction: NORMAL
Lines Detected: 15
Average Line Length: 25.3 px
Angle Variance: 12.0
Confidence: 100%
Reasons: All criteria satisfied
-----------------------------------
Generated by LC Nematic Phase Detector";
        assert_eq!(report, expected);
    }

    #[test]
    fn anomaly_report_lists_reasons_in_order() {
        let features = FeatureSet {
            line_count: 3,
            avg_length: 8.0,
            angle_variance: 45.0,
        };
        let result = classify(&features, &ClassificationConfig::default());
        let report = to_report(&features, &result, "now", &ReportMetadata::default());

        assert!(report.contains("Prediction: ANOMALY"));
        assert!(report.contains("Confidence: 0%"));
        let lines_at = report.find("Lines detected (3)").unwrap_or(usize::MAX);
        let angle_at = report.find("Angle variance (45.0)").unwrap_or(usize::MAX);
        let length_at = report.find("Average line length (8.0px)").unwrap_or(usize::MAX);
        assert!(lines_at < angle_at && angle_at < length_at, "{report}");
    }

    #[test]
    fn mean_length_rounded_to_two_decimals() {
        let features = FeatureSet {
            line_count: 2,
            avg_length: 17.456_789,
            angle_variance: 3.14159,
        };
        let result = classify(&features, &ClassificationConfig::default());
        let report = to_report(&features, &result, "t", &ReportMetadata::default());
        assert!(report.contains("Average Line Length: 17.46 px"), "{report}");
        assert!(report.contains("Angle Variance: 3.1\n"), "{report}");
    }

    #[test]
    fn metadata_lines_emitted_when_present() {
        let (features, result) = normal();
        let metadata = ReportMetadata {
            source: Some("sample-01.png"),
            config_json: Some(r#"{"min_lines":10}"#),
        };
        let report = to_report(&features, &result, "t", &metadata);
        assert!(report.contains("Date: t\nSource: sample-01.png\nPrediction:"));
        assert!(report.contains("Config: {\"min_lines\":10}\n---"));
    }

    #[test]
    fn report_has_no_trailing_newline() {
        let (features, result) = normal();
        let report = to_report(&features, &result, "t", &ReportMetadata::default());
        assert!(report.ends_with(FOOTER));
    }
}
