//! # Pipeline Configuration Module
//!
//! Configuration structures for the scan pipeline: tiling limits, the
//! per-tile retry policy, the whole-request timeout, and cache settings.

// Constants for pipeline configuration
pub const DEFAULT_MAX_TILE_WIDTH: u32 = 1024;
pub const DEFAULT_MAX_TILE_HEIGHT: u32 = 1024;
pub const DEFAULT_OVERLAP_FRACTION: f32 = 0.10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 256;

/// Retry policy applied uniformly to every tile's recognition calls.
///
/// One value object instead of hand-duplicated retry chains per call site:
/// the pipeline walks attempts, backs off exponentially with jitter, and
/// escalates quality on payload errors when enabled.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum recognition attempts per tile
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds
    pub base_delay_ms: u64,
    /// Maximum delay between attempts in milliseconds
    pub max_delay_ms: u64,
    /// Re-encode the tile at reduced size when the service reports the
    /// payload is too large, and at raised quality on the critical-tile
    /// recovery attempt
    pub quality_escalation: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8000,
            quality_escalation: true,
        }
    }
}

impl RetryPolicy {
    /// Validate retry policy parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".to_string());
        }
        if self.base_delay_ms == 0 {
            return Err("base_delay_ms must be greater than 0".to_string());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(format!(
                "max_delay_ms ({}) must be >= base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            ));
        }
        Ok(())
    }
}

/// Configuration structure for the scan pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum tile width in pixels (handwriting is capped lower internally)
    pub max_tile_width: u32,
    /// Maximum tile height in pixels
    pub max_tile_height: u32,
    /// Fraction of the tile size adjacent tiles share (handwriting is raised
    /// internally)
    pub overlap_fraction: f32,
    /// Whole-request timeout in seconds; the only cancellation mechanism
    pub request_timeout_secs: u64,
    /// Per-tile retry policy
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_tile_width: DEFAULT_MAX_TILE_WIDTH,
            max_tile_height: DEFAULT_MAX_TILE_HEIGHT,
            overlap_fraction: DEFAULT_OVERLAP_FRACTION,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Validate pipeline configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.max_tile_width < 64 || self.max_tile_height < 64 {
            return Err(format!(
                "tile size {}x{} is below the 64px minimum",
                self.max_tile_width, self.max_tile_height
            ));
        }
        if !(0.0..=0.9).contains(&self.overlap_fraction) {
            return Err(format!(
                "overlap_fraction ({}) must be within 0.0 to 0.9",
                self.overlap_fraction
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than 0".to_string());
        }
        self.retry.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
        assert!(RetryPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_retry_policy_validation() {
        let mut policy = RetryPolicy::default();

        policy.max_attempts = 0;
        assert!(policy.validate().is_err());
        policy.max_attempts = 3;

        policy.base_delay_ms = 0;
        assert!(policy.validate().is_err());
        policy.base_delay_ms = 500;

        policy.max_delay_ms = 100;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_pipeline_config_validation() {
        let mut config = PipelineConfig::default();

        config.max_tile_width = 32;
        assert!(config.validate().is_err());
        config.max_tile_width = 1024;

        config.overlap_fraction = 0.95;
        assert!(config.validate().is_err());
        config.overlap_fraction = 0.1;

        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());
        config.request_timeout_secs = 120;

        assert!(config.validate().is_ok());
    }
}
