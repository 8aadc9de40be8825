//! # Adaptive Thresholding Module
//!
//! Local adaptive mean thresholding: each pixel is compared against the mean
//! of its `block_size`-square neighborhood minus an offset, so uneven
//! lighting across a photographed page does not wash out whole regions the
//! way a single global cutoff would. Foreground (ink) becomes black,
//! background white.
//!
//! Window sums come from an integral image, which keeps the pass linear in
//! the pixel count regardless of block size.

use image::{GrayImage, Luma};
use tracing::debug;

use super::types::PreprocessingError;

/// Foreground (ink) value in binarized images
pub const FOREGROUND: u8 = 0;
/// Background (paper) value in binarized images
pub const BACKGROUND: u8 = 255;

/// Apply local adaptive mean thresholding to a greyscale image.
///
/// For each pixel, the mean of the surrounding `block_size` x `block_size`
/// window is computed (clipped at the image borders); the pixel becomes
/// foreground (black) when its value is below `mean - offset`, background
/// (white) otherwise. Larger blocks tolerate broad lighting gradients;
/// larger offsets suppress faint texture.
///
/// # Arguments
///
/// * `gray` - Greyscale input image
/// * `block_size` - Neighborhood side length in pixels (minimum 3; even
///   values are widened to the next odd value)
/// * `offset` - Subtracted from the local mean before comparison
pub fn adaptive_mean_threshold(
    gray: &GrayImage,
    block_size: u32,
    offset: i16,
) -> Result<GrayImage, PreprocessingError> {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return Err(PreprocessingError::InvalidDimensions { width, height });
    }
    if block_size < 3 {
        return Err(PreprocessingError::ProcessingFailed {
            message: format!("threshold block size {} is below the 3px minimum", block_size),
        });
    }

    let block = if block_size % 2 == 0 {
        block_size + 1
    } else {
        block_size
    };
    let radius = (block / 2) as i64;

    let integral = integral_image(gray);
    let iw = width as i64;
    let ih = height as i64;

    let mut binary = GrayImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let x0 = (x as i64 - radius).max(0);
            let y0 = (y as i64 - radius).max(0);
            let x1 = (x as i64 + radius).min(iw - 1);
            let y1 = (y as i64 + radius).min(ih - 1);

            let area = ((x1 - x0 + 1) * (y1 - y0 + 1)) as u64;
            let sum = window_sum(&integral, iw, x0, y0, x1, y1);
            let mean = (sum / area) as i32;

            let value = if (gray.get_pixel(x, y)[0] as i32) < mean - offset as i32 {
                FOREGROUND
            } else {
                BACKGROUND
            };
            binary.put_pixel(x, y, Luma([value]));
        }
    }

    debug!(
        target: "scan_preprocessing",
        block_size = %block,
        offset = %offset,
        dimensions = %format!("{}x{}", width, height),
        "Applied adaptive mean threshold"
    );

    Ok(binary)
}

/// Summed-area table with one row and column of zero padding, so window sums
/// need no edge special-casing.
fn integral_image(gray: &GrayImage) -> Vec<u64> {
    let width = gray.width() as usize;
    let height = gray.height() as usize;
    let stride = width + 1;

    let mut integral = vec![0u64; stride * (height + 1)];
    for y in 0..height {
        let mut row_sum = 0u64;
        for x in 0..width {
            row_sum += gray.get_pixel(x as u32, y as u32)[0] as u64;
            integral[(y + 1) * stride + (x + 1)] = integral[y * stride + (x + 1)] + row_sum;
        }
    }
    integral
}

/// Inclusive window sum over `[x0, x1] x [y0, y1]` from the padded integral
fn window_sum(integral: &[u64], width: i64, x0: i64, y0: i64, x1: i64, y1: i64) -> u64 {
    let stride = (width + 1) as usize;
    let a = integral[(y1 as usize + 1) * stride + (x1 as usize + 1)];
    let b = integral[(y0 as usize) * stride + (x1 as usize + 1)];
    let c = integral[(y1 as usize + 1) * stride + (x0 as usize)];
    let d = integral[(y0 as usize) * stride + (x0 as usize)];
    a + d - b - c
}

/// Fraction of foreground pixels in a binarized image
pub fn foreground_ratio(binary: &GrayImage) -> f32 {
    let total = (binary.width() as u64 * binary.height() as u64).max(1);
    let fg = binary.pixels().filter(|p| p[0] == FOREGROUND).count() as u64;
    fg as f32 / total as f32
}
