//! Detected segments drawn over the binary mask.

use image::{GrayImage, Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;

use crate::types::LineSegment;

/// Stroke colour for segments.
pub const LINE_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Stroke width in pixels.
pub const LINE_THICKNESS: i32 = 2;

/// Render `lines` in [`LINE_COLOR`] on an RGBA copy of `binary`.
///
/// Each segment is stroked [`LINE_THICKNESS`] pixels wide by repeating
/// it with a one-pixel offset across its minor axis.
#[must_use = "returns the overlay image"]
pub fn draw_segments(binary: &GrayImage, lines: &[LineSegment]) -> RgbaImage {
    let mut canvas = RgbaImage::from_fn(binary.width(), binary.height(), |x, y| {
        let v = binary.get_pixel(x, y).0[0];
        Rgba([v, v, v, 255])
    });

    for line in lines {
        let (x1, y1) = line.start();
        let (x2, y2) = line.end();
        let horizontal = (x2 - x1).abs() >= (y2 - y1).abs();
        for offset in 0..LINE_THICKNESS {
            let (ox, oy) = if horizontal { (0, offset) } else { (offset, 0) };
            #[allow(clippy::cast_precision_loss)]
            draw_line_segment_mut(
                &mut canvas,
                ((x1 + ox) as f32, (y1 + oy) as f32),
                ((x2 + ox) as f32, (y2 + oy) as f32),
                LINE_COLOR,
            );
        }
    }
    canvas
}
