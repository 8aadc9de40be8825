//! # exam-scan
//!
//! Client-side document image preprocessing and layout reconstruction for
//! photographed exam papers. A raw, possibly skewed, unevenly lit photo is
//! deskewed, enhanced, and split into overlapping tiles for an external
//! recognition service; the per-tile results are then stitched back into a
//! single, correctly ordered document.
//!
//! The crate performs no character recognition itself: the recognizer is
//! consumed through the [`Recognizer`] trait and everything else (capture,
//! upload, evaluation, persistence) belongs to the host application.

pub mod cache;
pub mod document_class;
pub mod errors;
pub mod pipeline;
pub mod pipeline_config;
pub mod preprocessing;
pub mod reassembly;
pub mod recognizer;
pub mod segmentation;

// Re-export types for easier access
pub use cache::{CacheStats, RecognitionCache, TileCacheKey};
pub use document_class::{classify, BrightnessBucket, Classification, DocumentClass};
pub use errors::{PipelineError, PipelineResult};
pub use pipeline::{ScanOutcome, ScanPipeline};
pub use pipeline_config::{PipelineConfig, RetryPolicy};
pub use reassembly::{reassemble, Segment};
pub use recognizer::{RecognizeFuture, Recognizer, RecognizerError};
pub use segmentation::{segment, Tile, TileKind};
