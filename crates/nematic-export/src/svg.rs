//! SVG export serializer.
//!
//! Converts detected line segments into an SVG string with one `<path>`
//! per segment, using the [`svg`] crate for document construction, XML
//! escaping, and path data formatting. The `viewBox` is the source
//! image's pixel grid, so the document overlays the original 1:1.
//!
//! Optional [`SvgMetadata`] embeds `<title>`, `<desc>`, and a
//! `<metadata>` block carrying the analysis configuration.
//!
//! Pure function with no I/O; returns a `String`.

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Description, Element, Path, Title};
use svg::node::{Node, Text, Value};

use nematic_pipeline::{Dimensions, LineSegment};

/// Stroke colour of each segment.
pub const STROKE_COLOR: &str = "red";

/// Stroke width of each segment, in pixels.
pub const STROKE_WIDTH: u32 = 2;

/// Metadata to embed in the SVG document.
///
/// All fields are optional. Text values are XML-escaped automatically
/// by the `svg` crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title, emitted as `<title>`. Typically the source image
    /// filename.
    pub title: Option<&'a str>,

    /// Document description, emitted as `<desc>`. Typically the phase,
    /// confidence, and a timestamp.
    pub description: Option<&'a str>,

    /// Serialized [`ClassificationConfig`](nematic_pipeline::ClassificationConfig),
    /// emitted inside `<metadata>` wrapped in a namespaced
    /// `<nematic:config>` element so exported files carry the settings
    /// that produced them.
    pub config_json: Option<&'a str>,
}

/// Build an SVG path `d` attribute string for one segment.
///
/// # Examples
///
/// ```
/// use nematic_pipeline::LineSegment;
/// use nematic_export::build_segment_data;
///
/// let d = build_segment_data(LineSegment::new(10, 20, 30, 40));
/// assert_eq!(d, "M10,20 L30,40");
/// ```
#[must_use]
pub fn build_segment_data(segment: LineSegment) -> String {
    let (x1, y1) = segment.start();
    let (x2, y2) = segment.end();
    let data = Data::new()
        .move_to((f64::from(x1), f64::from(y1)))
        .line_to((f64::from(x2), f64::from(y2)));
    String::from(Value::from(data))
}

/// Serialize line segments into an SVG document string.
///
/// The document is `dimensions.width` by `dimensions.height` user units
/// with a matching `viewBox`. Segments keep their pixel coordinates.
#[must_use]
pub fn to_svg(
    segments: &[LineSegment],
    dimensions: Dimensions,
    metadata: &SvgMetadata<'_>,
) -> String {
    let (w, h) = (dimensions.width, dimensions.height);
    let mut doc = Document::new()
        .set("width", w)
        .set("height", h)
        .set("viewBox", (0, 0, w, h));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }

    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }

    if let Some(config_json) = metadata.config_json {
        let mut config_el = Element::new("nematic:config");
        config_el.assign("xmlns:nematic", "https://github.com/altendky/nematic/ns/1");
        config_el.append(Text::new(config_json));
        let mut metadata_el = Element::new("metadata");
        metadata_el.append(config_el);
        doc = doc.add(metadata_el);
    }

    for &segment in segments {
        let path = Path::new()
            .set("d", build_segment_data(segment))
            .set("fill", "none")
            .set("stroke", STROKE_COLOR)
            .set("stroke-width", STROKE_WIDTH)
            .set("stroke-linecap", "round");
        doc = doc.add(path);
    }

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}
