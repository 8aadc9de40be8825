//! # Adaptive Enhancement Module
//!
//! Turns a de-skewed photo into a clean binarized image the recognizer can
//! read: geometry normalization, brightness statistics, class-keyed
//! parameter selection, contrast stretch, class-weighted greyscale, optional
//! denoise and sharpening, local adaptive thresholding, and a
//! handwriting-only stroke repair pass.
//!
//! Enhancement never fails the pipeline: when the full pipeline errors, a
//! two-step fallback (greyscale plus a single contrast pass from the same
//! parameter table) produces a usable image and the result is flagged
//! degraded.

use std::time::Instant;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use tracing::{debug, warn};

use super::filtering::{denoise, despeckle, dilate, sharpen, sobel_edge_map, union};
use super::params::{
    adjust_for_sparse_handwriting, dimension_band, grey_weights, lookup, EnhancementParams,
};
use super::quality::{compute_stats, sample_edge_density};
use super::thresholding::adaptive_mean_threshold;
use super::types::{EnhancedImageResult, PreprocessingError};
use crate::document_class::{BrightnessBucket, DocumentClass};

/// Sampled edge density below which handwriting counts as sparse
const SPARSE_HANDWRITING_DENSITY: f32 = 0.045;

/// Enhance a page image for recognition.
///
/// Runs the full adaptive pipeline and falls back to the simple two-step
/// variant on any internal error; the fallback result carries
/// `degraded = true` so the pipeline can log the downgrade without failing
/// the request.
pub fn enhance(
    image: &DynamicImage,
    class: DocumentClass,
) -> Result<EnhancedImageResult, PreprocessingError> {
    let start_time = Instant::now();

    match enhance_full(image, class) {
        Ok((enhanced, bucket, params)) => {
            debug!(
                target: "scan_preprocessing",
                class = %class,
                bucket = ?bucket,
                elapsed_ms = %start_time.elapsed().as_millis(),
                "Enhancement completed"
            );
            Ok(EnhancedImageResult {
                image: enhanced,
                brightness_bucket: bucket,
                params,
                degraded: false,
                processing_time_ms: start_time.elapsed().as_millis() as u32,
            })
        }
        Err(err) => {
            warn!(
                target: "scan_preprocessing",
                class = %class,
                error = %err,
                "Full enhancement failed, falling back to simple pipeline"
            );
            let (enhanced, bucket, params) = enhance_fallback(image, class)?;
            Ok(EnhancedImageResult {
                image: enhanced,
                brightness_bucket: bucket,
                params,
                degraded: true,
                processing_time_ms: start_time.elapsed().as_millis() as u32,
            })
        }
    }
}

/// The full adaptive pipeline.
fn enhance_full(
    image: &DynamicImage,
    class: DocumentClass,
) -> Result<(DynamicImage, BrightnessBucket, EnhancementParams), PreprocessingError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(PreprocessingError::InvalidDimensions { width, height });
    }

    // Binarization needs an opaque background, so transparency is flattened
    // onto white before anything else
    let rgba = flatten_onto_white(&image.to_rgba8());
    let rgba = normalize_geometry(rgba, class);

    let luma = DynamicImage::ImageRgba8(rgba.clone()).to_luma8();
    let stats = compute_stats(&luma);
    let bucket = BrightnessBucket::from_brightness(stats.mean_brightness);
    let mut params = lookup(class, bucket);

    if class.is_handwritten() {
        let density = sample_edge_density(&luma, params.edge_threshold);
        if density < SPARSE_HANDWRITING_DENSITY {
            debug!(
                target: "scan_preprocessing",
                edge_density = %density,
                "Sparse handwriting detected, widening stroke repair"
            );
            params = adjust_for_sparse_handwriting(params);
        }
    }

    let adjusted = apply_contrast_brightness(&rgba, params.contrast, params.brightness_offset);
    let gray = weighted_greyscale(&adjusted, grey_weights(class));
    let gray = denoise(&gray, params.denoise_sigma);
    let gray = sharpen(&gray, params.sharpen_strength);

    let binary = adaptive_mean_threshold(&gray, params.threshold_block_size, params.threshold_offset)?;

    let binary = if class.is_handwritten() {
        repair_strokes(&gray, &binary, &params)
    } else {
        binary
    };

    Ok((DynamicImage::ImageLuma8(binary), bucket, params))
}

/// Two-step fallback: greyscale plus one contrast pass from the same class
/// table, binarizing handwriting when the threshold pass succeeds.
fn enhance_fallback(
    image: &DynamicImage,
    class: DocumentClass,
) -> Result<(DynamicImage, BrightnessBucket, EnhancementParams), PreprocessingError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(PreprocessingError::InvalidDimensions { width, height });
    }

    let gray = image.to_luma8();
    let stats = compute_stats(&gray);
    let bucket = BrightnessBucket::from_brightness(stats.mean_brightness);
    let params = lookup(class, bucket);

    let mut adjusted = GrayImage::new(width, height);
    for (x, y, pixel) in gray.enumerate_pixels() {
        let v = (pixel[0] as f32 - 128.0) * params.contrast + 128.0 + params.brightness_offset;
        adjusted.put_pixel(x, y, Luma([v.clamp(0.0, 255.0) as u8]));
    }

    if class.is_handwritten() {
        if let Ok(binary) =
            adaptive_mean_threshold(&adjusted, params.threshold_block_size, params.threshold_offset)
        {
            return Ok((DynamicImage::ImageLuma8(binary), bucket, params));
        }
    }

    Ok((DynamicImage::ImageLuma8(adjusted), bucket, params))
}

/// Composite an RGBA image onto a white background
fn flatten_onto_white(rgba: &RgbaImage) -> RgbaImage {
    let mut out = RgbaImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = pixel[3] as f32 / 255.0;
        let blend = |c: u8| -> u8 { (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8 };
        out.put_pixel(x, y, Rgba([blend(pixel[0]), blend(pixel[1]), blend(pixel[2]), 255]));
    }
    out
}

/// Resize so the larger dimension lands inside the class band. Images
/// already inside the band pass through untouched.
fn normalize_geometry(rgba: RgbaImage, class: DocumentClass) -> RgbaImage {
    let (min_dim, max_dim) = dimension_band(class);
    let (width, height) = rgba.dimensions();
    let larger = width.max(height);

    let scale = if larger < min_dim {
        min_dim as f32 / larger as f32
    } else if larger > max_dim {
        max_dim as f32 / larger as f32
    } else {
        return rgba;
    };

    let new_width = ((width as f32 * scale).round() as u32).max(1);
    let new_height = ((height as f32 * scale).round() as u32).max(1);
    debug!(
        target: "scan_preprocessing",
        from = %format!("{}x{}", width, height),
        to = %format!("{}x{}", new_width, new_height),
        "Normalized image geometry"
    );
    imageops::resize(&rgba, new_width, new_height, FilterType::CatmullRom)
}

/// Linear contrast stretch around the 128 midpoint plus a brightness offset,
/// applied per RGB channel
fn apply_contrast_brightness(rgba: &RgbaImage, contrast: f32, brightness: f32) -> RgbaImage {
    let mut out = RgbaImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let adjust =
            |c: u8| -> u8 { ((c as f32 - 128.0) * contrast + 128.0 + brightness).clamp(0.0, 255.0) as u8 };
        out.put_pixel(
            x,
            y,
            Rgba([adjust(pixel[0]), adjust(pixel[1]), adjust(pixel[2]), pixel[3]]),
        );
    }
    out
}

/// Greyscale conversion with per-class channel weights
fn weighted_greyscale(rgba: &RgbaImage, weights: [f32; 3]) -> GrayImage {
    let mut gray = GrayImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let v = pixel[0] as f32 * weights[0]
            + pixel[1] as f32 * weights[1]
            + pixel[2] as f32 * weights[2];
        gray.put_pixel(x, y, Luma([v.clamp(0.0, 255.0) as u8]));
    }
    gray
}

/// Handwriting stroke repair: thicken detected ink edges and merge them into
/// the binarization, then remove isolated noise pixels. Sparse handwriting
/// arrives here with a widened stroke radius and a more conservative
/// despeckle window so genuine thin strokes are not erased.
fn repair_strokes(gray: &GrayImage, binary: &GrayImage, params: &EnhancementParams) -> GrayImage {
    let edges = sobel_edge_map(gray, params.edge_threshold);
    let thickened = dilate(&edges, params.stroke_width.round() as u32);
    let merged = union(binary, &thickened);
    despeckle(
        &merged,
        params.despeckle_min_neighbors,
        params.despeckle_window_radius,
    )
}
