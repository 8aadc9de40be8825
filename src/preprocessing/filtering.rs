//! # Image Filtering Module
//!
//! Noise reduction, sharpening, edge detection, and binary morphology used
//! by the adaptive enhancer: Gaussian-weighted denoise, Laplacian-style
//! unsharp masking, a Sobel edge map for stroke repair, mask dilation, and
//! isolated-pixel removal (despeckle).

use image::{GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;
use tracing::debug;

use super::quality::sobel_magnitude_at;
use super::thresholding::{BACKGROUND, FOREGROUND};

/// Gaussian-weighted noise reduction.
///
/// `sigma` controls the blur strength; values at or below zero return the
/// input unchanged so the parameter table can disable the pass per class.
pub fn denoise(gray: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return gray.clone();
    }
    let denoised = gaussian_blur_f32(gray, sigma);
    debug!(
        target: "scan_preprocessing",
        sigma = %sigma,
        "Applied Gaussian denoise"
    );
    denoised
}

/// Unsharp-mask sharpening: amplify the difference between each pixel and a
/// Gaussian-blurred copy. `strength` of zero returns the input unchanged.
pub fn sharpen(gray: &GrayImage, strength: f32) -> GrayImage {
    if strength <= 0.0 {
        return gray.clone();
    }

    let blurred = gaussian_blur_f32(gray, 1.0);
    let mut sharpened = GrayImage::new(gray.width(), gray.height());

    for (x, y, pixel) in gray.enumerate_pixels() {
        let original = pixel[0] as f32;
        let blur = blurred.get_pixel(x, y)[0] as f32;
        let value = original + strength * (original - blur);
        sharpened.put_pixel(x, y, Luma([value.clamp(0.0, 255.0) as u8]));
    }

    debug!(
        target: "scan_preprocessing",
        strength = %strength,
        "Applied unsharp-mask sharpening"
    );

    sharpened
}

/// Sobel edge map: pixels whose gradient magnitude exceeds `threshold`
/// become foreground (black), everything else background.
pub fn sobel_edge_map(gray: &GrayImage, threshold: u16) -> GrayImage {
    let (width, height) = gray.dimensions();
    let mut edges = GrayImage::from_pixel(width, height, Luma([BACKGROUND]));
    if width < 3 || height < 3 {
        return edges;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            if sobel_magnitude_at(gray, x, y) > threshold {
                edges.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
    }
    edges
}

/// Dilate the foreground of a binary image by `radius` pixels (square
/// structuring element). Used to thicken thin ink strokes before merging
/// the edge map into the binarization.
pub fn dilate(binary: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return binary.clone();
    }

    let (width, height) = binary.dimensions();
    let r = radius as i64;
    let mut dilated = GrayImage::from_pixel(width, height, Luma([BACKGROUND]));

    for (x, y, pixel) in binary.enumerate_pixels() {
        if pixel[0] != FOREGROUND {
            continue;
        }
        let x0 = (x as i64 - r).max(0) as u32;
        let y0 = (y as i64 - r).max(0) as u32;
        let x1 = (x as i64 + r).min(width as i64 - 1) as u32;
        let y1 = (y as i64 + r).min(height as i64 - 1) as u32;
        for ny in y0..=y1 {
            for nx in x0..=x1 {
                dilated.put_pixel(nx, ny, Luma([FOREGROUND]));
            }
        }
    }

    dilated
}

/// Merge two binary images: a pixel is foreground when it is foreground in
/// either input.
pub fn union(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let mut merged = a.clone();
    for (x, y, pixel) in b.enumerate_pixels() {
        if pixel[0] == FOREGROUND {
            merged.put_pixel(x, y, Luma([FOREGROUND]));
        }
    }
    merged
}

/// Remove isolated foreground pixels: a foreground pixel with fewer than
/// `min_neighbors` foreground neighbors inside a window of `window_radius`
/// becomes background.
///
/// `window_radius` of 1 checks the 8-neighborhood; sparse handwriting uses a
/// radius of 2 so genuine thin strokes, whose neighbors sit further away,
/// survive the pass.
pub fn despeckle(binary: &GrayImage, min_neighbors: u8, window_radius: u32) -> GrayImage {
    let (width, height) = binary.dimensions();
    let r = window_radius.max(1) as i64;
    let mut cleaned = binary.clone();
    let mut removed: u32 = 0;

    for (x, y, pixel) in binary.enumerate_pixels() {
        if pixel[0] != FOREGROUND {
            continue;
        }

        let x0 = (x as i64 - r).max(0) as u32;
        let y0 = (y as i64 - r).max(0) as u32;
        let x1 = (x as i64 + r).min(width as i64 - 1) as u32;
        let y1 = (y as i64 + r).min(height as i64 - 1) as u32;

        let mut neighbors = 0u8;
        'scan: for ny in y0..=y1 {
            for nx in x0..=x1 {
                if (nx, ny) == (x, y) {
                    continue;
                }
                if binary.get_pixel(nx, ny)[0] == FOREGROUND {
                    neighbors += 1;
                    if neighbors >= min_neighbors {
                        break 'scan;
                    }
                }
            }
        }

        if neighbors < min_neighbors {
            cleaned.put_pixel(x, y, Luma([BACKGROUND]));
            removed += 1;
        }
    }

    if removed > 0 {
        debug!(
            target: "scan_preprocessing",
            removed = %removed,
            min_neighbors = %min_neighbors,
            window_radius = %window_radius,
            "Despeckle removed isolated pixels"
        );
    }

    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([BACKGROUND]))
    }

    #[test]
    fn test_denoise_zero_sigma_is_identity() {
        let img = GrayImage::from_pixel(10, 10, Luma([123]));
        let out = denoise(&img, 0.0);
        assert_eq!(out, img);
    }

    #[test]
    fn test_sharpen_zero_strength_is_identity() {
        let img = GrayImage::from_pixel(10, 10, Luma([123]));
        assert_eq!(sharpen(&img, 0.0), img);
    }

    #[test]
    fn test_sharpen_increases_edge_contrast() {
        let mut img = GrayImage::from_pixel(20, 20, Luma([200]));
        for y in 0..20 {
            for x in 0..10 {
                img.put_pixel(x, y, Luma([60]));
            }
        }
        let sharpened = sharpen(&img, 1.0);
        // Pixels at the boundary move away from the blurred mean
        assert!(sharpened.get_pixel(9, 10)[0] <= img.get_pixel(9, 10)[0]);
        assert!(sharpened.get_pixel(10, 10)[0] >= img.get_pixel(10, 10)[0]);
    }

    #[test]
    fn test_sobel_edge_map_flat_image_has_no_edges() {
        let img = GrayImage::from_pixel(15, 15, Luma([90]));
        let edges = sobel_edge_map(&img, 96);
        assert!(edges.pixels().all(|p| p[0] == BACKGROUND));
    }

    #[test]
    fn test_sobel_edge_map_finds_step_edge() {
        let mut img = GrayImage::from_pixel(20, 20, Luma([255]));
        for y in 0..20 {
            for x in 0..10 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        let edges = sobel_edge_map(&img, 96);
        assert_eq!(edges.get_pixel(9, 10)[0], FOREGROUND);
        assert_eq!(edges.get_pixel(10, 10)[0], FOREGROUND);
        assert_eq!(edges.get_pixel(3, 10)[0], BACKGROUND);
    }

    #[test]
    fn test_dilate_grows_single_pixel() {
        let mut img = blank(9, 9);
        img.put_pixel(4, 4, Luma([FOREGROUND]));
        let dilated = dilate(&img, 1);
        for y in 3..=5 {
            for x in 3..=5 {
                assert_eq!(dilated.get_pixel(x, y)[0], FOREGROUND);
            }
        }
        assert_eq!(dilated.get_pixel(1, 1)[0], BACKGROUND);
    }

    #[test]
    fn test_dilate_zero_radius_is_identity() {
        let mut img = blank(5, 5);
        img.put_pixel(2, 2, Luma([FOREGROUND]));
        assert_eq!(dilate(&img, 0), img);
    }

    #[test]
    fn test_union_merges_foregrounds() {
        let mut a = blank(5, 5);
        a.put_pixel(1, 1, Luma([FOREGROUND]));
        let mut b = blank(5, 5);
        b.put_pixel(3, 3, Luma([FOREGROUND]));
        let merged = union(&a, &b);
        assert_eq!(merged.get_pixel(1, 1)[0], FOREGROUND);
        assert_eq!(merged.get_pixel(3, 3)[0], FOREGROUND);
        assert_eq!(merged.get_pixel(2, 2)[0], BACKGROUND);
    }

    #[test]
    fn test_despeckle_removes_lone_pixel_keeps_stroke() {
        let mut img = blank(20, 20);
        // Lone speck
        img.put_pixel(2, 2, Luma([FOREGROUND]));
        // Horizontal stroke
        for x in 8..16 {
            img.put_pixel(x, 10, Luma([FOREGROUND]));
        }
        let cleaned = despeckle(&img, 2, 1);
        assert_eq!(cleaned.get_pixel(2, 2)[0], BACKGROUND);
        assert_eq!(cleaned.get_pixel(12, 10)[0], FOREGROUND);
    }

    #[test]
    fn test_despeckle_wider_window_keeps_sparse_strokes() {
        let mut img = blank(20, 20);
        // Dotted stroke with one-pixel gaps; the 8-neighborhood check would
        // erase it but the radius-2 window sees the dots
        for x in (4..16).step_by(2) {
            img.put_pixel(x, 10, Luma([FOREGROUND]));
        }
        let strict = despeckle(&img, 2, 1);
        let loose = despeckle(&img, 2, 2);
        assert_eq!(strict.get_pixel(8, 10)[0], BACKGROUND);
        assert_eq!(loose.get_pixel(8, 10)[0], FOREGROUND);
    }
}
