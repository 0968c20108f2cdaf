//! Gaussian smoothing for noise suppression before binarization.
//!
//! The kernel is specified by its side length rather than by sigma.
//! Sigma is derived from the size with the usual rule of thumb
//! `0.3 * ((k - 1) / 2 - 1) + 0.8`, which keeps most of the Gaussian's
//! mass inside the window.
//!
//! The Gaussian is separable, so the image is filtered with the 1-D
//! weights along rows and then columns using
//! [`imageproc::filter::separable_filter_equal`]. That costs `O(k)` per
//! pixel rather than `O(k^2)`. Filtering runs on `f32` samples and each
//! result is rounded to the nearest `u8`, so a flat region keeps its
//! exact value.
//!
//! Borders replicate the outermost pixel (`aaa|abc`). This differs from
//! the reflect-101 border (`cb|abc`) common in other imaging toolkits;
//! the two only disagree within `k / 2` pixels of the image edge.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::separable_filter_equal;

use crate::config::{ClassificationConfig, next_odd};

/// Sigma implied by an odd kernel size.
#[must_use]
pub fn sigma_for_kernel_size(kernel_size: u32) -> f32 {
    let k = f64::from(next_odd(kernel_size));
    #[allow(clippy::cast_possible_truncation)]
    let sigma = 0.3f64.mul_add((k - 1.0).mul_add(0.5, -1.0), 0.8) as f32;
    sigma
}

/// Normalized 1-D Gaussian weights of length `kernel_size`.
#[must_use]
pub fn gaussian_weights(kernel_size: u32) -> Vec<f32> {
    let size = next_odd(kernel_size);
    let sigma = f64::from(sigma_for_kernel_size(size));
    let radius = f64::from(size / 2);
    let denom = 2.0 * sigma * sigma;

    let raw: Vec<f64> = (0..size)
        .map(|i| {
            let d = f64::from(i) - radius;
            (-(d * d) / denom).exp()
        })
        .collect();
    let total: f64 = raw.iter().sum();

    #[allow(clippy::cast_possible_truncation)]
    raw.iter().map(|w| (w / total) as f32).collect()
}

/// Smooth a grayscale image with a square Gaussian kernel.
///
/// Even `kernel_size` values are incremented to the next odd value.
/// A size of `1` (or `0`) returns an unchanged copy. Sizes above
/// [`ClassificationConfig::MAX_SMOOTHING_KERNEL_SIZE`] are clamped to it;
/// [`ClassificationConfig::validate`] rejects them before the pipeline
/// gets here.
#[must_use = "returns the smoothed image"]
pub fn gaussian_smooth(image: &GrayImage, kernel_size: u32) -> GrayImage {
    let size = next_odd(kernel_size.min(ClassificationConfig::MAX_SMOOTHING_KERNEL_SIZE));
    if size <= 1 {
        return image.clone();
    }

    let weights = gaussian_weights(size);
    let samples: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
            Luma([f32::from(image.get_pixel(x, y).0[0])])
        });
    let filtered = separable_filter_equal(&samples, &weights);

    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let value = filtered.get_pixel(x, y).0[0];
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rounded = value.round().clamp(0.0, 255.0) as u8;
        Luma([rounded])
    })
}
