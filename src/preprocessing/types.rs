//! # Shared Types for Image Preprocessing
//!
//! This module contains the shared types, result structs, and error
//! definitions used across the preprocessing sub-modules.

use image::DynamicImage;

use crate::document_class::BrightnessBucket;
use crate::preprocessing::params::EnhancementParams;

/// Errors that can occur during image preprocessing operations.
///
/// These never cross the pipeline boundary: the pipeline absorbs them by
/// skipping the failed stage or falling back to a simpler algorithm.
#[derive(Debug, Clone)]
pub enum PreprocessingError {
    /// Image has a zero or otherwise unusable dimension
    InvalidDimensions { width: u32, height: u32 },
    /// Image processing operation failed
    ProcessingFailed { message: String },
}

impl std::fmt::Display for PreprocessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreprocessingError::InvalidDimensions { width, height } => {
                write!(f, "Invalid image dimensions: {}x{}", width, height)
            }
            PreprocessingError::ProcessingFailed { message } => {
                write!(f, "Image processing failed: {}", message)
            }
        }
    }
}

impl std::error::Error for PreprocessingError {}

/// Result of the skew correction stage.
#[derive(Debug, Clone)]
pub struct DeskewResult {
    /// The de-rotated image (the input image when rotation was skipped)
    pub image: DynamicImage,
    /// Detected skew angle in degrees, clamped to the ±7° working range.
    /// Zero when the estimate was below the 0.5° noise threshold.
    pub angle_degrees: f32,
    /// Whether a rotation was actually applied
    pub rotated: bool,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// Result of the adaptive enhancement stage.
#[derive(Debug, Clone)]
pub struct EnhancedImageResult {
    /// The enhanced, binarized image
    pub image: DynamicImage,
    /// Brightness bucket measured on the normalized image
    pub brightness_bucket: BrightnessBucket,
    /// Parameters selected from the class/brightness table
    pub params: EnhancementParams,
    /// True when the full pipeline failed and the simple two-step fallback
    /// produced this image instead
    pub degraded: bool,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// Whole-raster pixel statistics driving parameter selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterStats {
    /// Mean brightness over all pixels (0.0 to 255.0)
    pub mean_brightness: f32,
    /// Fraction of very dark pixels (below 40)
    pub dark_fraction: f32,
    /// Fraction of very light pixels (above 215)
    pub light_fraction: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocessing_error_display() {
        let err = PreprocessingError::InvalidDimensions {
            width: 0,
            height: 200,
        };
        assert!(err.to_string().contains("0x200"));

        let err = PreprocessingError::ProcessingFailed {
            message: "empty histogram".to_string(),
        };
        assert!(err.to_string().contains("empty histogram"));
    }
}
