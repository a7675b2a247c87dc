//! Pipeline configuration.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default upscale factor.
pub const DEFAULT_SCALE: u32 = 3;
/// Default grid rows.
pub const DEFAULT_ROWS: u32 = 3;
/// Default grid columns.
pub const DEFAULT_COLS: u32 = 3;
/// Tile padding at the default 3x scale, in canvas pixels.
pub const PADDING_AT_3X: u32 = 160;
/// Long-edge cap for the context reference image.
pub const DEFAULT_CONTEXT_MAX_DIM: u32 = 1024;
/// JPEG quality for the context reference.
pub const DEFAULT_CONTEXT_QUALITY: u8 = 80;
/// JPEG quality for tile crops sent to the service.
pub const DEFAULT_TILE_QUALITY: u8 = 95;
/// Per-tile call timeout.
pub const DEFAULT_TILE_TIMEOUT: Duration = Duration::from_secs(120);
/// Largest accepted upscale factor.
pub const MAX_SCALE: u32 = 16;
/// Largest accepted row or column count. Each tile gets its own worker.
pub const MAX_GRID_DIM: u32 = 16;

/// Canvas padding for a given scale factor: 160 px at 3x, proportional elsewhere.
#[must_use]
pub fn padding_for_scale(scale: u32) -> u32 {
    PADDING_AT_3X.saturating_mul(scale) / 3
}

/// Retry policy applied to retryable tile failures before falling back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one. `0` disables retries.
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `backoff * n`.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// No retries: a failed tile falls back immediately.
    pub const NONE: Self = Self {
        max_retries: 0,
        backoff: Duration::ZERO,
    };

    /// Delay before the attempt following attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::NONE
    }
}

/// Options controlling the tiled upscale pipeline.
#[derive(Debug, Clone)]
pub struct UpscaleConfig {
    /// Integer upscale factor.
    pub scale: u32,
    /// Grid rows.
    pub rows: u32,
    /// Grid columns.
    pub cols: u32,
    /// Overlap padding around each tile, in canvas pixels.
    pub padding: u32,
    /// Long-edge cap for the context image.
    pub context_max_dim: u32,
    /// JPEG quality (1-100) of the context image.
    pub context_quality: u8,
    /// JPEG quality (1-100) of tile crops.
    pub tile_quality: u8,
    /// Timeout handed to the collaborator for each tile call.
    pub tile_timeout: Duration,
    /// Retry policy for retryable tile failures.
    pub retry: RetryPolicy,
}

impl Default for UpscaleConfig {
    fn default() -> Self {
        Self::for_scale(DEFAULT_SCALE)
    }
}

impl UpscaleConfig {
    /// Default configuration with padding derived from `scale`.
    #[must_use]
    pub fn for_scale(scale: u32) -> Self {
        Self {
            scale,
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            padding: padding_for_scale(scale),
            context_max_dim: DEFAULT_CONTEXT_MAX_DIM,
            context_quality: DEFAULT_CONTEXT_QUALITY,
            tile_quality: DEFAULT_TILE_QUALITY,
            tile_timeout: DEFAULT_TILE_TIMEOUT,
            retry: RetryPolicy::NONE,
        }
    }

    /// Number of tiles per request.
    #[must_use]
    pub fn tile_count(&self) -> usize {
        (self.rows as usize) * (self.cols as usize)
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_SCALE).contains(&self.scale) {
            return Err(Error::InvalidConfig(format!(
                "scale must be in 1..={MAX_SCALE}, got {}",
                self.scale
            )));
        }
        let dims = 1..=MAX_GRID_DIM;
        if !dims.contains(&self.rows) || !dims.contains(&self.cols) {
            return Err(Error::InvalidConfig(format!(
                "grid must be between 1x1 and {MAX_GRID_DIM}x{MAX_GRID_DIM}, got {}x{}",
                self.rows, self.cols
            )));
        }
        if self.context_max_dim == 0 {
            return Err(Error::InvalidConfig(
                "context_max_dim must be at least 1".into(),
            ));
        }
        for (name, quality) in [
            ("context_quality", self.context_quality),
            ("tile_quality", self.tile_quality),
        ] {
            if !(1..=100).contains(&quality) {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be in 1..=100, got {quality}"
                )));
            }
        }
        if self.tile_timeout.is_zero() {
            return Err(Error::InvalidConfig("tile_timeout must be non-zero".into()));
        }
        Ok(())
    }
}
