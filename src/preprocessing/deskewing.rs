//! # Image Deskewing Module
//!
//! Skew detection and correction for photographed exam pages. The estimate
//! is made on a binarized working copy; the rotation is applied to the
//! original raster so no enhancement artifacts leak into later stages.
//!
//! Printed and handwritten pages skew differently: printed text lines are
//! long contiguous dark spans, so scanline run analysis works well, while
//! handwriting needs connected-component slopes because its lines are broken
//! and uneven.

use std::time::Instant;

use image::{DynamicImage, Rgba, RgbaImage};
use tracing::debug;

use super::thresholding::{adaptive_mean_threshold, FOREGROUND};
use super::types::{DeskewResult, PreprocessingError};
use crate::document_class::DocumentClass;

/// Estimates beyond this magnitude are unreliable on photographed pages
const MAX_SKEW_DEGREES: f32 = 7.0;
/// Below this magnitude rotation is skipped: small estimates are mostly
/// noise and visually irrelevant
const SKIP_THRESHOLD_DEGREES: f32 = 0.5;

/// Scanlines sampled by the printed-text estimator
const SCANLINE_COUNT: u32 = 30;
/// Vertical offset of the above/below density bands around a run
const BAND_OFFSET: u32 = 3;
/// Longest runs kept per scanline
const RUNS_PER_SCANLINE: usize = 3;

/// Grid step for handwritten component seeding
const COMPONENT_GRID_STEP: u32 = 16;
/// Flood-fill visited cap per component, against runaway fills on noisy scans
const COMPONENT_PIXEL_CAP: usize = 4000;
/// Components smaller than this carry no reliable slope
const COMPONENT_MIN_PIXELS: usize = 60;

/// Detect and correct the skew of a page photo.
///
/// The working copy is binarized with class-keyed adaptive thresholding:
/// printed glyphs are dense and need fine locality (small block, high
/// offset), handwriting strokes are thin and sparse (large block, low
/// offset). The estimate is clamped to ±7°; estimates at or below 0.5° skip
/// rotation entirely and return the input image untouched. When rotation is
/// applied, the output canvas is expanded to contain the whole rotated image
/// with a white fill for exposed background.
pub fn correct_skew(
    image: &DynamicImage,
    class: DocumentClass,
) -> Result<DeskewResult, PreprocessingError> {
    let start_time = Instant::now();

    let gray = image.to_luma8();
    let (block_size, offset) = if class.is_handwritten() {
        (25, 8)
    } else {
        (15, 12)
    };
    let binary = adaptive_mean_threshold(&gray, block_size, offset)?;

    let estimate = if class.is_handwritten() {
        estimate_skew_handwritten(&binary)
    } else {
        estimate_skew_printed(&binary)
    };

    let angle = estimate
        .unwrap_or(0.0)
        .clamp(-MAX_SKEW_DEGREES, MAX_SKEW_DEGREES);

    if angle.abs() <= SKIP_THRESHOLD_DEGREES {
        debug!(
            target: "scan_preprocessing",
            angle = %angle,
            class = %class,
            "Skew below threshold, skipping rotation"
        );
        return Ok(DeskewResult {
            image: image.clone(),
            angle_degrees: angle,
            rotated: false,
            processing_time_ms: start_time.elapsed().as_millis() as u32,
        });
    }

    // Rotate the original raster, not the binarized working copy
    let rotated = rotate_with_expansion(image, -angle);

    debug!(
        target: "scan_preprocessing",
        angle = %angle,
        class = %class,
        "Corrected page skew"
    );

    Ok(DeskewResult {
        image: rotated,
        angle_degrees: angle,
        rotated: true,
        processing_time_ms: start_time.elapsed().as_millis() as u32,
    })
}

/// Skew estimate for printed pages via scanline run analysis.
///
/// Samples evenly spaced horizontal scanlines; on each, the longest runs of
/// foreground pixels are candidate text-line segments. For each run, the
/// foreground density in a band a few pixels above is compared against the
/// band below: a tilted line leaves more of its ink on one side. The local
/// tilt is `atan2(above - below, run_length)`. The per-run estimates are
/// combined robustly: median first, then a weighted average of estimates
/// near the median with the median itself weighted three times.
fn estimate_skew_printed(binary: &image::GrayImage) -> Option<f32> {
    let (width, height) = binary.dimensions();
    if width < 64 || height < 2 * BAND_OFFSET + 2 {
        return None;
    }

    let step = (height / SCANLINE_COUNT).max(1);
    let min_run_length = (width / 20).max(32);

    let mut estimates = Vec::new();
    let mut y = BAND_OFFSET;
    while y < height - BAND_OFFSET {
        let mut runs: Vec<(u32, u32)> = foreground_runs(binary, y)
            .into_iter()
            .filter(|&(_, len)| len >= min_run_length)
            .collect();
        runs.sort_by(|a, b| b.1.cmp(&a.1));

        for &(start, len) in runs.iter().take(RUNS_PER_SCANLINE) {
            let above = row_foreground_count(binary, start, len, y - BAND_OFFSET);
            let below = row_foreground_count(binary, start, len, y + BAND_OFFSET);
            let tilt = (above as f32 - below as f32).atan2(len as f32).to_degrees();
            estimates.push(tilt);
        }

        y += step;
    }

    if estimates.len() < 5 {
        return None;
    }
    Some(robust_average(&mut estimates))
}

/// Runs of foreground pixels on one scanline, as `(start_x, length)`.
/// Gaps up to the tolerance are bridged so inter-glyph and inter-word
/// spacing does not fragment a text line into word-sized runs; column
/// gutters are wider than the tolerance and still split runs.
fn foreground_runs(binary: &image::GrayImage, y: u32) -> Vec<(u32, u32)> {
    const GAP_TOLERANCE: u32 = 12;
    let width = binary.width();

    let mut runs = Vec::new();
    let mut run_start: Option<u32> = None;
    let mut gap = 0u32;
    let mut last_fg = 0u32;

    for x in 0..width {
        if binary.get_pixel(x, y)[0] == FOREGROUND {
            if run_start.is_none() {
                run_start = Some(x);
            }
            last_fg = x;
            gap = 0;
        } else if let Some(start) = run_start {
            gap += 1;
            if gap > GAP_TOLERANCE {
                runs.push((start, last_fg - start + 1));
                run_start = None;
                gap = 0;
            }
        }
    }
    if let Some(start) = run_start {
        runs.push((start, last_fg - start + 1));
    }
    runs
}

/// Count foreground pixels on row `y` within the x-extent of a run
fn row_foreground_count(binary: &image::GrayImage, start: u32, len: u32, y: u32) -> u32 {
    let end = (start + len).min(binary.width());
    (start..end)
        .filter(|&x| binary.get_pixel(x, y)[0] == FOREGROUND)
        .count() as u32
}

/// Median, then weighted average of the estimates within 1.5° of the median
/// with the median contributing three times the weight of any neighbor.
fn robust_average(estimates: &mut [f32]) -> f32 {
    const NEAR_MEDIAN_DEGREES: f32 = 1.5;

    estimates.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = estimates[estimates.len() / 2];

    let mut sum = 2.0 * median;
    let mut weight = 2.0;
    for &e in estimates.iter() {
        if (e - median).abs() <= NEAR_MEDIAN_DEGREES {
            sum += e;
            weight += 1.0;
        }
    }
    sum / weight
}

/// Skew estimate for handwritten pages via connected-component slopes.
///
/// Seeds flood fills from a coarse grid; every component that is wider than
/// it is tall (a word or line fragment) contributes the slope between the
/// average mid-height of its left half and its right half. The median slope
/// across components is the page estimate.
fn estimate_skew_handwritten(binary: &image::GrayImage) -> Option<f32> {
    let (width, height) = binary.dimensions();
    if width < 48 || height < 48 {
        return None;
    }

    let mut visited = vec![false; (width as usize) * (height as usize)];
    let mut estimates = Vec::new();

    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            let idx = (y as usize) * (width as usize) + x as usize;
            if binary.get_pixel(x, y)[0] == FOREGROUND && !visited[idx] {
                let component = flood_fill(binary, x, y, &mut visited);
                if component.len() >= COMPONENT_MIN_PIXELS {
                    if let Some(angle) = component_slope(&component) {
                        estimates.push(angle);
                    }
                }
            }
            x += COMPONENT_GRID_STEP;
        }
        y += COMPONENT_GRID_STEP;
    }

    if estimates.len() < 3 {
        return None;
    }
    estimates.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Some(estimates[estimates.len() / 2])
}

/// Bounded breadth-first flood fill of one foreground component. The
/// visited-set cap stops runaway fills on pages where noise connects large
/// regions.
fn flood_fill(
    binary: &image::GrayImage,
    seed_x: u32,
    seed_y: u32,
    visited: &mut [bool],
) -> Vec<(u32, u32)> {
    let (width, height) = binary.dimensions();
    let w = width as usize;

    let mut component = Vec::new();
    let mut queue = std::collections::VecDeque::new();

    visited[(seed_y as usize) * w + seed_x as usize] = true;
    queue.push_back((seed_x, seed_y));

    while let Some((x, y)) = queue.pop_front() {
        component.push((x, y));
        if component.len() >= COMPONENT_PIXEL_CAP {
            break;
        }

        let neighbors = [
            (x.wrapping_sub(1), y),
            (x + 1, y),
            (x, y.wrapping_sub(1)),
            (x, y + 1),
        ];
        for (nx, ny) in neighbors {
            if nx >= width || ny >= height {
                continue;
            }
            let idx = (ny as usize) * w + nx as usize;
            if !visited[idx] && binary.get_pixel(nx, ny)[0] == FOREGROUND {
                visited[idx] = true;
                queue.push_back((nx, ny));
            }
        }
    }

    component
}

/// Slope of a wider-than-tall component from the average mid-height of its
/// top and bottom edges, sampled per column, compared between the left and
/// right halves of its bounding box.
fn component_slope(pixels: &[(u32, u32)]) -> Option<f32> {
    let min_x = pixels.iter().map(|p| p.0).min()?;
    let max_x = pixels.iter().map(|p| p.0).max()?;
    let min_y = pixels.iter().map(|p| p.1).min()?;
    let max_y = pixels.iter().map(|p| p.1).max()?;

    let width = (max_x - min_x + 1) as usize;
    let height = (max_y - min_y + 1) as usize;
    if width <= height || width < 24 {
        return None;
    }

    // Top and bottom edge y per column
    let mut edges: Vec<Option<(u32, u32)>> = vec![None; width];
    for &(x, y) in pixels {
        let col = (x - min_x) as usize;
        edges[col] = Some(match edges[col] {
            Some((top, bottom)) => (top.min(y), bottom.max(y)),
            None => (y, y),
        });
    }

    let half = width / 2;
    let half_mean = |range: std::ops::Range<usize>| -> Option<f32> {
        let mids: Vec<f32> = range
            .filter_map(|col| edges[col].map(|(top, bottom)| (top + bottom) as f32 / 2.0))
            .collect();
        if mids.is_empty() {
            None
        } else {
            Some(mids.iter().sum::<f32>() / mids.len() as f32)
        }
    };

    let left = half_mean(0..half)?;
    let right = half_mean(half..width)?;
    let dx = (width as f32) / 2.0;

    Some(((right - left) / dx).atan().to_degrees())
}

/// Rotate an image around its center, expanding the canvas to contain the
/// whole rotated extent with a white fill for exposed background. Nearest
/// neighbor sampling preserves glyph sharpness at the small angles this
/// module deals in.
pub fn rotate_with_expansion(image: &DynamicImage, angle_degrees: f32) -> DynamicImage {
    let source = image.to_rgba8();
    let (width, height) = source.dimensions();
    let angle_rad = angle_degrees.to_radians();
    let cos_a = angle_rad.cos();
    let sin_a = angle_rad.sin();

    // Rotated extents of the four corners around the center
    let corners = [
        (-(width as f32) / 2.0, -(height as f32) / 2.0),
        (width as f32 / 2.0, -(height as f32) / 2.0),
        (-(width as f32) / 2.0, height as f32 / 2.0),
        (width as f32 / 2.0, height as f32 / 2.0),
    ];
    let mut max_x: f32 = 0.0;
    let mut max_y: f32 = 0.0;
    for (x, y) in corners {
        max_x = max_x.max((x * cos_a - y * sin_a).abs());
        max_y = max_y.max((x * sin_a + y * cos_a).abs());
    }
    let new_width = (2.0 * max_x).ceil() as u32;
    let new_height = (2.0 * max_y).ceil() as u32;

    let mut output = RgbaImage::from_pixel(new_width, new_height, Rgba([255, 255, 255, 255]));

    for y in 0..new_height {
        for x in 0..new_width {
            // Map output pixel back into the source frame
            let cx = x as f32 - new_width as f32 / 2.0;
            let cy = y as f32 - new_height as f32 / 2.0;
            let src_x = cx * cos_a + cy * sin_a + width as f32 / 2.0;
            let src_y = -cx * sin_a + cy * cos_a + height as f32 / 2.0;

            if src_x >= 0.0 && src_x < width as f32 && src_y >= 0.0 && src_y < height as f32 {
                let pixel = source.get_pixel(src_x as u32, src_y as u32);
                output.put_pixel(x, y, *pixel);
            }
        }
    }

    DynamicImage::ImageRgba8(output)
}
