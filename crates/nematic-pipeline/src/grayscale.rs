//! Image decoding and grayscale conversion.
//!
//! [`decode`] is the loader: raw bytes (PNG, JPEG, BMP, WebP) in,
//! `RgbaImage` out. [`to_grayscale`] is the first half of the
//! preprocessor and collapses RGBA to a single luma channel.

use image::{GrayImage, Luma, RgbaImage};

use crate::types::PipelineError;

/// Fixed-point BT.601 luma weights, scaled by `1 << LUMA_SHIFT`.
const LUMA_SHIFT: u32 = 14;
const LUMA_R: u32 = 4899; // 0.299
const LUMA_G: u32 = 9617; // 0.587
const LUMA_B: u32 = 1868; // 0.114
const _: () = assert!(LUMA_R + LUMA_G + LUMA_B == 1 << LUMA_SHIFT);

/// Decode raw image bytes into an RGBA pixel grid.
///
/// Grayscale and palette sources are expanded to RGBA so the rest of
/// the pipeline sees a single layout.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the format is unrecognized
/// or the data is corrupt.
/// Returns [`PipelineError::InvalidInput`] if the decoded image has a
/// zero dimension.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    check_dimensions(&rgba)?;
    Ok(rgba)
}

/// Reject images with a zero-length axis.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidInput`] naming `image` when either
/// axis is zero.
pub fn check_dimensions(image: &RgbaImage) -> Result<(), PipelineError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PipelineError::invalid(
            "image",
            format!("dimensions must be non-zero, got {width}x{height}"),
        ));
    }
    Ok(())
}

/// Convert an RGBA image to single-channel luma.
///
/// Uses the BT.601 weighting `0.299*R + 0.587*G + 0.114*B` in 14-bit
/// fixed point with rounding. Alpha is ignored.
#[must_use = "returns the grayscale image"]
pub fn to_grayscale(image: &RgbaImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, _] = image.get_pixel(x, y).0;
        let weighted =
            u32::from(r) * LUMA_R + u32::from(g) * LUMA_G + u32::from(b) * LUMA_B;
        let rounded = (weighted + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT;
        // The weights sum to exactly 1.0, so the result never exceeds 255.
        Luma([u8::try_from(rounded).unwrap_or(u8::MAX)])
    })
}
