//! Canny edge detection over the binary mask.
//!
//! The input is already smoothed and binarized, so unlike
//! `imageproc::edges::canny` no Gaussian blur is applied here. Gradient
//! magnitude is the L1 norm `|gx| + |gy|` of the 3x3 Sobel responses.
//!
//! Hysteresis walks all eight neighbours of each accepted pixel and
//! bounds-checks every neighbour before reading it. The upstream
//! implementation skips the north and north-east neighbours and can
//! underflow at the image border
//! (<https://github.com/image-rs/imageproc/issues/705>).

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::filter::filter_clamped;
use imageproc::kernel;

/// Gradient magnitude at or above which a pixel may continue an edge.
pub const CANNY_LOW_THRESHOLD: f32 = 100.0;

/// Gradient magnitude at or above which a pixel starts an edge.
pub const CANNY_HIGH_THRESHOLD: f32 = 200.0;

const _: () = assert!(CANNY_LOW_THRESHOLD <= CANNY_HIGH_THRESHOLD);

/// Edge pixel value in the output map.
pub const EDGE: u8 = 255;

/// Quantized gradient direction used for non-maximum suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Horizontal,
    Diagonal,
    Vertical,
    AntiDiagonal,
}

impl Direction {
    /// Bucket a gradient into one of four directions, 45 degrees apart.
    fn quantize(gx: f32, gy: f32) -> Self {
        let mut angle = gy.atan2(gx).to_degrees();
        if angle < 0.0 {
            angle += 180.0;
        }
        if (22.5..67.5).contains(&angle) {
            Self::Diagonal
        } else if (67.5..112.5).contains(&angle) {
            Self::Vertical
        } else if (112.5..157.5).contains(&angle) {
            Self::AntiDiagonal
        } else {
            Self::Horizontal
        }
    }

    /// The two neighbours of `(x, y)` along the gradient.
    ///
    /// The caller guarantees `1 <= x < width - 1` and `1 <= y < height - 1`.
    const fn neighbours(self, x: u32, y: u32) -> [(u32, u32); 2] {
        match self {
            Self::Horizontal => [(x - 1, y), (x + 1, y)],
            Self::Diagonal => [(x + 1, y + 1), (x - 1, y - 1)],
            Self::Vertical => [(x, y - 1), (x, y + 1)],
            Self::AntiDiagonal => [(x - 1, y + 1), (x + 1, y - 1)],
        }
    }
}

/// Detect edges using the Canny algorithm with explicit thresholds.
///
/// Returns a map where [`EDGE`] marks edge pixels and `0` marks the
/// background. `low_threshold` is clamped to at most `high_threshold`.
#[must_use = "returns the binary edge map"]
pub fn canny_with_thresholds(
    image: &GrayImage,
    low_threshold: f32,
    high_threshold: f32,
) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return GrayImage::new(width, height);
    }
    let low = low_threshold.min(high_threshold);

    let gx: Image<Luma<i16>> = filter_clamped(image, kernel::SOBEL_HORIZONTAL_3X3);
    let gy: Image<Luma<i16>> = filter_clamped(image, kernel::SOBEL_VERTICAL_3X3);

    let magnitude = Image::from_fn(width, height, |x, y| {
        let h = f32::from(gx.get_pixel(x, y).0[0]);
        let v = f32::from(gy.get_pixel(x, y).0[0]);
        Luma([h.abs() + v.abs()])
    });

    let thinned = non_maximum_suppression(&magnitude, &gx, &gy);
    hysteresis(&thinned, low, high_threshold)
}

/// Detect edges with the fixed [`CANNY_LOW_THRESHOLD`] and
/// [`CANNY_HIGH_THRESHOLD`].
#[must_use = "returns the binary edge map"]
pub fn canny(image: &GrayImage) -> GrayImage {
    canny_with_thresholds(image, CANNY_LOW_THRESHOLD, CANNY_HIGH_THRESHOLD)
}

/// Zero every pixel that is not a local maximum along its gradient.
/// The one-pixel border is always zero.
fn non_maximum_suppression(
    g: &Image<Luma<f32>>,
    gx: &Image<Luma<i16>>,
    gy: &Image<Luma<i16>>,
) -> Image<Luma<f32>> {
    let (width, height) = g.dimensions();
    let mut out = Image::from_pixel(width, height, Luma([0.0f32]));
    if width < 3 || height < 3 {
        return out;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let here = g.get_pixel(x, y).0[0];
            if here == 0.0 {
                continue;
            }
            let direction = Direction::quantize(
                f32::from(gx.get_pixel(x, y).0[0]),
                f32::from(gy.get_pixel(x, y).0[0]),
            );
            let [a, b] = direction.neighbours(x, y);
            let is_max = here >= g.get_pixel(a.0, a.1).0[0] && here >= g.get_pixel(b.0, b.1).0[0];
            if is_max {
                out.put_pixel(x, y, Luma([here]));
            }
        }
    }
    out
}

/// Keep strong pixels and every weak pixel 8-connected to one.
/// Non-recursive depth-first flood from each strong seed.
fn hysteresis(input: &Image<Luma<f32>>, low: f32, high: f32) -> GrayImage {
    let (width, height) = input.dimensions();
    let mut out = GrayImage::new(width, height);
    let mut stack: Vec<(u32, u32)> = Vec::new();

    for y in 0..height {
        for x in 0..width {
            if input.get_pixel(x, y).0[0] < high || out.get_pixel(x, y).0[0] == EDGE {
                continue;
            }
            out.put_pixel(x, y, Luma([EDGE]));
            stack.push((x, y));

            while let Some((cx, cy)) = stack.pop() {
                for (nx, ny) in neighbours8(cx, cy, width, height) {
                    if out.get_pixel(nx, ny).0[0] == 0 && input.get_pixel(nx, ny).0[0] >= low {
                        out.put_pixel(nx, ny, Luma([EDGE]));
                        stack.push((nx, ny));
                    }
                }
            }
        }
    }
    out
}

/// In-bounds 8-connected neighbours of `(x, y)`.
fn neighbours8(x: u32, y: u32, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    const OFFSETS: [(i64, i64); 8] = [
        (-1, -1),
        (0, -1),
        (1, -1),
        (-1, 0),
        (1, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
    ];
    OFFSETS.into_iter().filter_map(move |(dx, dy)| {
        let nx = u32::try_from(i64::from(x) + dx).ok()?;
        let ny = u32::try_from(i64::from(y) + dy).ok()?;
        (nx < width && ny < height).then_some((nx, ny))
    })
}
