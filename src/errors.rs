//! # Pipeline Error Types
//!
//! This module defines the errors that cross the scan pipeline boundary.
//! Stage-local failures (a deskew estimate that cannot be made, an enhancement
//! step that falls back to the simple pipeline, a tile whose recognition
//! fails) are absorbed inside the pipeline and downgraded to warnings; only
//! two conditions surface to the caller as errors: the image could not be
//! decoded at all, or no usable text could be produced after all retries.

use std::fmt;

use crate::recognizer::RecognizerError;

/// Errors returned by [`crate::pipeline::ScanPipeline::process`].
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The input bytes could not be decoded into an image. No pipeline stage
    /// runs after this.
    Decode(String),
    /// Every tile failed or returned empty text, so no document could be
    /// reconstructed. Carries a user-actionable message categorized by the
    /// most specific recognizer error code observed during the request.
    ReconstructionEmpty {
        message: String,
        code: Option<RecognizerError>,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Decode(msg) => write!(f, "[DECODE] Failed to decode image: {}", msg),
            PipelineError::ReconstructionEmpty { message, code } => match code {
                Some(code) => write!(f, "[EMPTY] {} (last error: {})", message, code),
                None => write!(f, "[EMPTY] {}", message),
            },
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        PipelineError::Decode(err.to_string())
    }
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Standardized error logging utilities for consistent reporting across the
/// pipeline stages.
pub mod error_logging {
    use tracing::warn;

    /// Log a preprocessing stage failure that was absorbed by a fallback path
    pub fn log_stage_degraded(stage: &str, error: &impl std::fmt::Display) {
        warn!(
            target: "scan_pipeline",
            stage = %stage,
            error = %error,
            "Preprocessing stage degraded, continuing with fallback"
        );
    }

    /// Log a per-tile recognition failure with placement context
    pub fn log_tile_error(
        error: &impl std::fmt::Display,
        tile_x: u32,
        tile_y: u32,
        attempts: u32,
    ) {
        warn!(
            target: "scan_pipeline",
            error = %error,
            tile_x = %tile_x,
            tile_y = %tile_y,
            attempts = %attempts,
            "Tile recognition failed"
        );
    }
}
