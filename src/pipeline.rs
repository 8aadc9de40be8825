//! # Scan Pipeline Module
//!
//! The caller-facing orchestration: decode, classify, deskew, enhance, tile,
//! fan recognition out across tiles, and reassemble the results into one
//! document.
//!
//! ## Concurrency model
//!
//! Tiles are independent, so one task is spawned per tile with no ordering
//! guarantee among them. Each tile is moved into its task and never aliased.
//! Reassembly is a hard synchronization barrier: it runs only once every
//! dispatched tile has either returned text or been marked failed. Partial
//! failure is not fatal; failed tiles are omitted with a warning. The
//! whole-request timeout is the only cancellation mechanism; in-flight
//! recognition calls are never cancelled individually.

use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use image::DynamicImage;
use metrics::{counter, histogram};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::{RecognitionCache, TileCacheKey};
use crate::document_class::{classify, DocumentClass};
use crate::errors::{error_logging, PipelineError, PipelineResult};
use crate::pipeline_config::{PipelineConfig, RetryPolicy};
use crate::preprocessing::types::DeskewResult;
use crate::preprocessing::{correct_skew, enhance};
use crate::reassembly::{reassemble, Segment};
use crate::recognizer::{Recognizer, RecognizerError};
use crate::segmentation::{segment, Tile};

/// Message used when no recognizer error code explains an empty result
const GENERIC_EMPTY_MESSAGE: &str =
    "No text could be recognized from the photo. Try a clearer, well-lit image.";

/// Downscale factor applied per payload-too-large retry
const PAYLOAD_DOWNSCALE: f32 = 0.7;
/// Upscale factor for the critical-tile recovery attempt
const CRITICAL_UPSCALE: f32 = 1.4;

/// Final result of a processing request.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// The reassembled document text
    pub text: String,
    /// Non-fatal degradations observed during processing
    pub warnings: Vec<String>,
    /// The document class the request was processed under
    pub class: DocumentClass,
    /// Skew angle detected (and corrected when beyond the noise threshold)
    pub skew_angle_degrees: f32,
}

/// Result of one tile's recognition task. A failed tile comes back with its
/// `error` field set, so the barrier can account for every dispatched tile.
enum TileOutcome {
    Recognized(Segment),
    Failed(Tile, Option<RecognizerError>),
}

/// The document scan pipeline.
///
/// # Examples
///
/// ```no_run
/// use exam_scan::{DocumentClass, PipelineConfig, RecognizeFuture, Recognizer, ScanPipeline};
///
/// struct RemoteOcr;
///
/// impl Recognizer for RemoteOcr {
///     fn recognize<'a>(&'a self, tile_png: &'a [u8], _class: DocumentClass) -> RecognizeFuture<'a> {
///         Box::pin(async move { Ok(format!("{} bytes received", tile_png.len())) })
///     }
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = ScanPipeline::new(RemoteOcr, PipelineConfig::default());
/// let bytes = std::fs::read("question_paper.jpg")?;
/// let outcome = pipeline
///     .process(&bytes, Some(DocumentClass::QuestionPaper))
///     .await?;
/// println!("{}", outcome.text);
/// # Ok(())
/// # }
/// ```
pub struct ScanPipeline<R: Recognizer> {
    recognizer: Arc<R>,
    config: PipelineConfig,
    cache: Option<Arc<RecognitionCache>>,
}

impl<R: Recognizer> ScanPipeline<R> {
    /// Create a pipeline around a recognizer and configuration
    pub fn new(recognizer: R, config: PipelineConfig) -> Self {
        Self {
            recognizer: Arc::new(recognizer),
            config,
            cache: None,
        }
    }

    /// Attach an explicit recognition cache. The cache is consulted before
    /// dispatching a tile and populated on success; TTL and eviction are the
    /// caller's choice.
    pub fn with_cache(mut self, cache: Arc<RecognitionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Process a photographed page into reassembled text.
    ///
    /// The explicit `class` override wins; without one the statistics-based
    /// classifier picks a class. Stage failures inside the pipeline are
    /// absorbed and reported through `warnings`; the only hard errors are an
    /// undecodable image and a request that produced no text at all.
    pub async fn process(
        &self,
        image_bytes: &[u8],
        class: Option<DocumentClass>,
    ) -> PipelineResult<ScanOutcome> {
        let start_time = Instant::now();
        let image = image::load_from_memory(image_bytes)?;

        let class = class.unwrap_or_else(|| {
            let guess = classify(&image);
            info!(
                target: "scan_pipeline",
                class = %guess.class,
                confidence = %guess.confidence,
                "No class supplied, classified from image statistics"
            );
            guess.class
        });

        let mut warnings = Vec::new();

        // Deskew failures are absorbed: the uncorrected image is still usable
        let deskew = correct_skew(&image, class).unwrap_or_else(|err| {
            error_logging::log_stage_degraded("deskew", &err);
            DeskewResult {
                image: image.clone(),
                angle_degrees: 0.0,
                rotated: false,
                processing_time_ms: 0,
            }
        });

        let enhanced = match enhance(&deskew.image, class) {
            Ok(result) => {
                if result.degraded {
                    warnings.push(
                        "Image enhancement fell back to a simplified pipeline; recognition accuracy may be reduced.".to_string(),
                    );
                }
                result.image
            }
            Err(err) => {
                error_logging::log_stage_degraded("enhance", &err);
                warnings.push(
                    "Image enhancement was skipped; recognition accuracy may be reduced.".to_string(),
                );
                deskew.image.clone()
            }
        };

        let tiles = segment(
            &enhanced,
            class,
            self.config.max_tile_width,
            self.config.max_tile_height,
            self.config.overlap_fraction,
        );
        counter!("scan_tiles_dispatched_total").increment(tiles.len() as u64);

        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        let collected = tokio::time::timeout(timeout, self.recognize_tiles(tiles, class)).await;

        let (segments, failed_tiles, observed_codes) = match collected {
            Ok(results) => results,
            Err(_) => {
                warn!(
                    target: "scan_pipeline",
                    timeout_secs = %self.config.request_timeout_secs,
                    "Request timed out before all tiles completed"
                );
                return Err(PipelineError::ReconstructionEmpty {
                    message: RecognizerError::Timeout.user_guidance().to_string(),
                    code: Some(RecognizerError::Timeout),
                });
            }
        };

        for tile in &failed_tiles {
            warnings.push(format!(
                "A region at ({}, {}) could not be recognized and was left out.",
                tile.x, tile.y
            ));
        }

        let usable: Vec<Segment> = segments
            .into_iter()
            .filter(|s| !s.text.trim().is_empty())
            .collect();

        if usable.is_empty() {
            let code = observed_codes
                .into_iter()
                .min_by_key(|c| c.specificity_rank());
            let message = code
                .map(|c| c.user_guidance().to_string())
                .unwrap_or_else(|| GENERIC_EMPTY_MESSAGE.to_string());
            return Err(PipelineError::ReconstructionEmpty { message, code });
        }

        let text = reassemble(&usable, class);

        info!(
            target: "scan_pipeline",
            class = %class,
            segments = %usable.len(),
            failed_tiles = %failed_tiles.len(),
            elapsed_ms = %start_time.elapsed().as_millis(),
            "Scan request completed"
        );

        Ok(ScanOutcome {
            text,
            warnings,
            class,
            skew_angle_degrees: deskew.angle_degrees,
        })
    }

    /// Fan recognition out across tiles and wait for every task. This is the
    /// synchronization barrier in front of reassembly.
    async fn recognize_tiles(
        &self,
        tiles: Vec<Tile>,
        class: DocumentClass,
    ) -> (Vec<Segment>, Vec<Tile>, Vec<RecognizerError>) {
        let mut join_set = JoinSet::new();

        for (index, tile) in tiles.into_iter().enumerate() {
            let recognizer = Arc::clone(&self.recognizer);
            let cache = self.cache.clone();
            let retry = self.config.retry.clone();
            // The first tile of a printed paper carries the opening question
            // block, so it earns one extra recovery attempt
            let critical = index == 0
                && matches!(
                    class,
                    DocumentClass::QuestionPaper | DocumentClass::ModelAnswer
                );

            join_set.spawn(async move {
                recognize_tile(recognizer, cache, retry, tile, class, critical).await
            });
        }

        let mut segments = Vec::new();
        let mut failed_tiles = Vec::new();
        let mut observed_codes = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(TileOutcome::Recognized(segment)) => segments.push(segment),
                Ok(TileOutcome::Failed(tile, code)) => {
                    if let Some(code) = code {
                        observed_codes.push(code);
                    }
                    failed_tiles.push(tile);
                }
                Err(join_err) => {
                    warn!(
                        target: "scan_pipeline",
                        error = %join_err,
                        "Tile task aborted"
                    );
                }
            }
        }

        (segments, failed_tiles, observed_codes)
    }
}

/// Recognize one tile with retries, backoff, and quality escalation.
async fn recognize_tile<R: Recognizer>(
    recognizer: Arc<R>,
    cache: Option<Arc<RecognitionCache>>,
    retry: RetryPolicy,
    tile: Tile,
    class: DocumentClass,
    critical: bool,
) -> TileOutcome {
    let start_time = Instant::now();

    let mut tile = tile;
    let mut png = match encode_png(&tile.image) {
        Ok(bytes) => bytes,
        Err(err) => {
            error_logging::log_tile_error(&err, tile.x, tile.y, 0);
            tile.error = Some(format!("tile encoding failed: {}", err));
            return TileOutcome::Failed(tile, None);
        }
    };

    if let Some(cache) = &cache {
        let key = TileCacheKey::for_tile(&png, class);
        if let Some(text) = cache.get(&key) {
            counter!("scan_cache_hits_total").increment(1);
            return TileOutcome::Recognized(bind_segment(&tile, text, false));
        }
    }

    let recovery_attempt = retry.max_attempts + 1;
    let max_attempts = if critical && retry.quality_escalation {
        recovery_attempt
    } else {
        retry.max_attempts
    };

    let mut rescaled = false;
    let mut last_code = None;

    for attempt in 1..=max_attempts {
        if attempt == recovery_attempt {
            // Critical-tile recovery: one extra attempt at raised quality
            if let Ok(upscaled) = encode_scaled(&tile.image, CRITICAL_UPSCALE) {
                png = upscaled;
                rescaled = true;
                debug!(
                    target: "scan_pipeline",
                    tile_x = %tile.x,
                    tile_y = %tile.y,
                    "Critical tile recovery attempt at raised quality"
                );
            }
        }

        match recognizer.recognize(&png, class).await {
            Ok(text) => {
                histogram!("scan_tile_recognition_ms")
                    .record(start_time.elapsed().as_millis() as f64);
                if let Some(cache) = &cache {
                    cache.insert(TileCacheKey::for_tile(&png, class), text.clone());
                }
                return TileOutcome::Recognized(bind_segment(&tile, text, rescaled));
            }
            Err(code) => {
                last_code = Some(code);
                if !code.is_retryable() || attempt >= max_attempts {
                    break;
                }

                if code == RecognizerError::PayloadTooLarge && retry.quality_escalation {
                    // Re-encode the same tile smaller before the next try
                    let scale = PAYLOAD_DOWNSCALE.powi(attempt as i32);
                    if let Ok(smaller) = encode_scaled(&tile.image, scale) {
                        png = smaller;
                        rescaled = true;
                    }
                }

                let delay = calculate_retry_delay(attempt, &retry);
                debug!(
                    target: "scan_pipeline",
                    tile_x = %tile.x,
                    tile_y = %tile.y,
                    attempt = %attempt,
                    code = %code,
                    delay_ms = %delay,
                    "Tile recognition attempt failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }
    }

    if let Some(code) = last_code {
        error_logging::log_tile_error(&code, tile.x, tile.y, max_attempts);
    }
    counter!("scan_tile_failures_total").increment(1);
    tile.error = Some(match last_code {
        Some(code) => format!("recognition failed: {}", code),
        None => "recognition failed".to_string(),
    });
    TileOutcome::Failed(tile, last_code)
}

/// Bind recognized text back to the tile's geometry
fn bind_segment(tile: &Tile, text: String, is_recovered: bool) -> Segment {
    Segment {
        text,
        x: tile.x,
        y: tile.y,
        width: tile.width,
        height: tile.height,
        is_recovered,
    }
}

/// Encode a tile image as PNG bytes
fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(bytes)
}

/// Re-encode a tile at a different scale
fn encode_scaled(image: &DynamicImage, scale: f32) -> Result<Vec<u8>> {
    let width = ((image.width() as f32 * scale).round() as u32).max(1);
    let height = ((image.height() as f32 * scale).round() as u32).max(1);
    let resized = image.resize_exact(width, height, image::imageops::FilterType::CatmullRom);
    encode_png(&resized)
}

/// Exponential backoff delay with random jitter to avoid thundering herds
pub fn calculate_retry_delay(attempt: u32, retry: &RetryPolicy) -> u64 {
    let base = retry.base_delay_ms as f64;
    let exponential = base * 2.0_f64.powf((attempt.saturating_sub(1)) as f64);
    let delay = exponential.min(retry.max_delay_ms as f64) as u64;

    if delay < 4 {
        return delay;
    }
    let jitter = rand::random::<u64>() % (delay / 4);
    delay + jitter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_grows_exponentially() {
        let retry = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 10000,
            quality_escalation: true,
        };
        let first = calculate_retry_delay(1, &retry);
        let second = calculate_retry_delay(2, &retry);
        let third = calculate_retry_delay(3, &retry);

        assert!((1000..=1250).contains(&first), "first delay {}", first);
        assert!((2000..=2500).contains(&second), "second delay {}", second);
        assert!((4000..=5000).contains(&third), "third delay {}", third);
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let retry = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 1000,
            max_delay_ms: 4000,
            quality_escalation: true,
        };
        let late = calculate_retry_delay(8, &retry);
        assert!(late <= 5000, "capped delay {}", late);
    }

    #[test]
    fn test_encode_png_round_trips() {
        let image = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(
            20,
            10,
            image::Luma([128]),
        ));
        let bytes = encode_png(&image).expect("encoding succeeds");
        let decoded = image::load_from_memory(&bytes).expect("png decodes");
        assert_eq!(decoded.width(), 20);
        assert_eq!(decoded.height(), 10);
    }

    #[test]
    fn test_encode_scaled_changes_dimensions() {
        let image = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(
            100,
            50,
            image::Luma([128]),
        ));
        let bytes = encode_scaled(&image, 0.5).expect("encoding succeeds");
        let decoded = image::load_from_memory(&bytes).expect("png decodes");
        assert_eq!(decoded.width(), 50);
        assert_eq!(decoded.height(), 25);
    }
}
