//! nematic-export: Pure format serializers (sans-IO)
//!
//! Renders analysis results as a plain-text report or as an SVG of the
//! detected line segments. Every function returns a `String`; writing
//! it anywhere is the caller's job.

pub mod report;
pub mod svg;

pub use report::{ReportMetadata, to_report};
pub use svg::{SvgMetadata, build_segment_data, to_svg};
