//! Adaptive local-mean binarization.
//!
//! Each pixel is compared against the mean of its `b x b` neighbourhood
//! minus a small constant offset. Near the border the window extends
//! past the image and the missing samples replicate the nearest edge
//! pixel (`aaa|abc`), so every window holds exactly `b * b` samples.
//!
//! Window sums come from an integral image, making the cost independent
//! of the block size. The replicated part of a window is a multiple of
//! an edge row, an edge column or a corner pixel, so it is added from
//! the same integral image rather than by padding the input.

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::integral_image::integral_image;

use crate::config::next_odd;

/// Constant subtracted from the local mean before comparison.
pub const MEAN_OFFSET: i64 = 1;

/// Value written for pixels above the local threshold.
pub const FOREGROUND: u8 = 255;

/// Value written for pixels at or below the local threshold.
pub const BACKGROUND: u8 = 0;

/// Binarize `image` against its local mean.
///
/// `block_size` is the window side length; even values are incremented
/// to the next odd value. The output pixel is [`FOREGROUND`] when
/// `src > mean - MEAN_OFFSET` and [`BACKGROUND`] otherwise, with the
/// mean rounded to the nearest integer.
#[must_use = "returns the binary mask"]
pub fn adaptive_mean_threshold(image: &GrayImage, block_size: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return GrayImage::new(width, height);
    }

    let radius = next_odd(block_size) / 2;
    // Padded by one row and column of zeros: entry (x, y) holds the sum
    // of all pixels strictly above and to the left.
    let sums: Image<Luma<u64>> = integral_image(image);
    let rect = |left: u32, top: u32, right: u32, bottom: u32| -> u128 {
        let at = |x: u32, y: u32| u128::from(sums.get_pixel(x, y).0[0]);
        at(right, bottom) + at(left, top) - at(left, bottom) - at(right, top)
    };
    let side = 2 * u128::from(radius) + 1;
    let area = side * side;
    let (last_x, last_y) = (width - 1, height - 1);

    GrayImage::from_fn(width, height, |x, y| {
        let left = x.saturating_sub(radius);
        let top = y.saturating_sub(radius);
        let right = x.saturating_add(radius).min(last_x) + 1;
        let bottom = y.saturating_add(radius).min(last_y) + 1;

        // Window columns and rows that fall outside the image.
        let past_left = u128::from(radius.saturating_sub(x));
        let past_right = u128::from(radius.saturating_sub(last_x - x));
        let past_top = u128::from(radius.saturating_sub(y));
        let past_bottom = u128::from(radius.saturating_sub(last_y - y));

        let corner = |cx: u32, cy: u32| rect(cx, cy, cx + 1, cy + 1);
        let window = rect(left, top, right, bottom)
            + past_left * rect(0, top, 1, bottom)
            + past_right * rect(last_x, top, width, bottom)
            + past_top * rect(left, 0, right, 1)
            + past_bottom * rect(left, last_y, right, height)
            + past_left * past_top * corner(0, 0)
            + past_left * past_bottom * corner(0, last_y)
            + past_right * past_top * corner(last_x, 0)
            + past_right * past_bottom * corner(last_x, last_y);
        let mean = (window + area / 2) / area;

        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let threshold = mean as i64 - MEAN_OFFSET;
        let value = i64::from(image.get_pixel(x, y).0[0]);

        Luma([if value > threshold {
            FOREGROUND
        } else {
            BACKGROUND
        }])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_binary(img: &GrayImage) -> bool {
        img.pixels()
            .all(|p| p.0[0] == FOREGROUND || p.0[0] == BACKGROUND)
    }

    /// Brute-force reference: full window with coordinates clamped into
    /// the image, no integral image.
    fn naive(image: &GrayImage, block_size: u32) -> GrayImage {
        let radius = i64::from(next_odd(block_size) / 2);
        let (w, h) = (i64::from(image.width()), i64::from(image.height()));
        GrayImage::from_fn(image.width(), image.height(), |x, y| {
            let (cx, cy) = (i64::from(x), i64::from(y));
            let mut sum = 0i64;
            let mut count = 0i64;
            for yy in (cy - radius)..=(cy + radius) {
                for xx in (cx - radius)..=(cx + radius) {
                    let (px, py) = (xx.clamp(0, w - 1), yy.clamp(0, h - 1));
                    sum += i64::from(image.get_pixel(px as u32, py as u32).0[0]);
                    count += 1;
                }
            }
            let mean = (sum + count / 2) / count;
            let src = i64::from(image.get_pixel(x, y).0[0]);
            Luma([if src > mean - 1 { 255 } else { 0 }])
        })
    }

    #[test]
    fn output_is_binary_with_same_dimensions() {
        let img = GrayImage::from_fn(23, 17, |x, y| Luma([((x * 37 + y * 11) % 256) as u8]));
        let out = adaptive_mean_threshold(&img, 11);
        assert_eq!(out.dimensions(), (23, 17));
        assert!(is_binary(&out));
    }

    #[test]
    fn uniform_image_is_all_foreground() {
        // Every pixel equals its mean, and mean - 1 < value.
        let img = GrayImage::from_pixel(12, 12, Luma([90]));
        let out = adaptive_mean_threshold(&img, 5);
        assert!(out.pixels().all(|p| p.0[0] == FOREGROUND));
    }

    #[test]
    fn dark_pixel_in_bright_field_is_background() {
        let mut img = GrayImage::from_pixel(9, 9, Luma([200]));
        img.put_pixel(4, 4, Luma([20]));
        let out = adaptive_mean_threshold(&img, 3);
        assert_eq!(out.get_pixel(4, 4).0[0], BACKGROUND);
        assert_eq!(out.get_pixel(0, 0).0[0], FOREGROUND);
    }

    #[test]
    fn matches_brute_force_reference() {
        let img = GrayImage::from_fn(31, 19, |x, y| {
            Luma([((x * x + 3 * y * y + x * y * 7) % 256) as u8])
        });
        for block in [3, 4, 7, 11, 25, 99] {
            assert_eq!(
                adaptive_mean_threshold(&img, block),
                naive(&img, block),
                "mismatch at block size {block}",
            );
        }
    }

    #[test]
    fn even_block_size_matches_next_odd() {
        let img = GrayImage::from_fn(16, 16, |x, y| Luma([((x * 13 + y * 29) % 256) as u8]));
        assert_eq!(
            adaptive_mean_threshold(&img, 6),
            adaptive_mean_threshold(&img, 7)
        );
    }

    #[test]
    fn border_window_replicates_edge_pixel() {
        // At x = 1 the 5-wide window reads [200, 200, 100, 50, 50]: mean
        // 120, so 100 is background. A window clipped to the image would
        // average [200, 100, 50, 50] to 100 and call it foreground.
        let img = GrayImage::from_fn(4, 1, |x, _| Luma([[200, 100, 50, 50][x as usize]]));
        let out = adaptive_mean_threshold(&img, 5);
        assert_eq!(out.get_pixel(1, 0).0[0], BACKGROUND);
        assert_eq!(out, naive(&img, 5));
    }

    #[test]
    fn block_larger_than_image_matches_brute_force() {
        let img = GrayImage::from_fn(5, 3, |x, y| Luma([(x * 50 + y * 7) as u8]));
        for block in [7, 13, 41] {
            assert_eq!(adaptive_mean_threshold(&img, block), naive(&img, block));
        }
    }

    #[test]
    fn single_pixel_image() {
        let img = GrayImage::from_pixel(1, 1, Luma([0]));
        let out = adaptive_mean_threshold(&img, 11);
        assert_eq!(out.get_pixel(0, 0).0[0], FOREGROUND);
    }
}
