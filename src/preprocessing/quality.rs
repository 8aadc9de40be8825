//! # Raster Statistics Module
//!
//! Whole-image pixel statistics used for adaptive parameter selection:
//! mean brightness, very-dark and very-light pixel fractions, and a sampled
//! edge-density estimate that separates sparse handwriting from dense
//! handwriting and blank pages from printed text.

use image::GrayImage;
use tracing::debug;

use super::types::RasterStats;

/// Pixels below this value count as "very dark" in [`compute_stats`]
pub const VERY_DARK: u8 = 40;
/// Pixels above this value count as "very light" in [`compute_stats`]
pub const VERY_LIGHT: u8 = 215;

/// Default Sobel gradient magnitude above which a sampled point counts as an
/// edge. Tuned so printed body text on a clean scan lands well above it.
pub const DEFAULT_EDGE_THRESHOLD: u16 = 96;

/// Compute mean brightness and dark/light pixel fractions over the whole
/// raster.
pub fn compute_stats(gray: &GrayImage) -> RasterStats {
    let total = (gray.width() as u64 * gray.height() as u64).max(1);

    let mut sum: u64 = 0;
    let mut dark: u64 = 0;
    let mut light: u64 = 0;

    for pixel in gray.pixels() {
        let v = pixel[0];
        sum += v as u64;
        if v < VERY_DARK {
            dark += 1;
        } else if v > VERY_LIGHT {
            light += 1;
        }
    }

    let stats = RasterStats {
        mean_brightness: sum as f32 / total as f32,
        dark_fraction: dark as f32 / total as f32,
        light_fraction: light as f32 / total as f32,
    };

    debug!(
        target: "scan_preprocessing",
        mean_brightness = %stats.mean_brightness,
        dark_fraction = %stats.dark_fraction,
        light_fraction = %stats.light_fraction,
        "Computed raster statistics"
    );

    stats
}

/// Estimate edge density by sampling a grid of points and testing the Sobel
/// gradient magnitude at each against `threshold`.
///
/// Returns the fraction of sampled points that are edges (0.0 to 1.0). The
/// grid step is chosen so roughly ten thousand points are sampled regardless
/// of image size, which keeps this cheap on large photos.
pub fn sample_edge_density(gray: &GrayImage, threshold: u16) -> f32 {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let target_samples = 10_000u32;
    let step = (((width as u64 * height as u64) / target_samples as u64) as f64)
        .sqrt()
        .max(1.0) as u32;

    let mut samples: u32 = 0;
    let mut edges: u32 = 0;

    let mut y = 1;
    while y < height - 1 {
        let mut x = 1;
        while x < width - 1 {
            if sobel_magnitude_at(gray, x, y) > threshold {
                edges += 1;
            }
            samples += 1;
            x += step;
        }
        y += step;
    }

    if samples == 0 {
        0.0
    } else {
        edges as f32 / samples as f32
    }
}

/// Sobel gradient magnitude at one interior pixel, as |gx| + |gy|.
pub(crate) fn sobel_magnitude_at(gray: &GrayImage, x: u32, y: u32) -> u16 {
    let p = |dx: i32, dy: i32| -> i32 {
        gray.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0] as i32
    };

    let gx = -p(-1, -1) - 2 * p(-1, 0) - p(-1, 1) + p(1, -1) + 2 * p(1, 0) + p(1, 1);
    let gy = -p(-1, -1) - 2 * p(0, -1) - p(1, -1) + p(-1, 1) + 2 * p(0, 1) + p(1, 1);

    (gx.abs() + gy.abs()).min(u16::MAX as i32) as u16
}
