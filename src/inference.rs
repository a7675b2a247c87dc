//! Tile inference: the collaborator seam and the scatter/gather adapter.
//!
//! Every tile is cropped from the base canvas, encoded, and sent together
//! with the context image to a [`TileEnhancer`]. Calls run concurrently on a
//! pool with one worker per tile. A tile whose call fails for any reason gets
//! its original crop back (the identity fallback) and the failure is logged;
//! only cancellation escapes as an error.
//!
//! Each call runs on its own detached thread while the tile worker waits on a
//! channel, polling the [`CancelFlag`]. A cancelled request stops waiting at
//! once and leaves in-flight calls to finish on their own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::imageops::{self, FilterType};
use image::RgbaImage;
use rayon::prelude::*;

use crate::codec::{self, EncodedImage};
use crate::config::RetryPolicy;
use crate::error::{Error, Result};
use crate::grid::Tile;

/// Instruction sent with every tile.
pub const RESTORATION_INSTRUCTION: &str = "\
Task: Professional Image Restoration & Texture Synthesis.
Role: You are an advanced AI Upscaler.
Input 1 (Context): The full original image (Low Res). Use it to understand the subject \
(e.g., person, landscape) and the lighting.
Input 2 (Target): A 3x zoomed crop of the same image.
Instruction:
1. Identify the material in the Target crop from the Context (e.g., if the Context shows a face, this crop is skin).
2. Synthesize realistic, high-frequency detail (skin pores, fabric weave, hair strands, metal grain) in the Target crop.
3. Remove all compression artifacts and blur.
4. Strictly keep the original geometry, color palette and lighting.
5. Output ONLY the restored Target crop.";

/// How often a waiting tile worker checks for cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Why a single tile call produced no usable image.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// The request could not be sent or the response not read.
    #[error("transport error: {0}")]
    Transport(String),

    /// The call exceeded its timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The service answered with a non-success status.
    #[error("service returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The response carried no image part.
    #[error("response contained no image data")]
    MissingImage,

    /// The response could not be parsed.
    #[error("malformed response: {0}")]
    InvalidResponse(String),

    /// The returned bytes are not a decodable image.
    #[error("returned payload is not an image: {0}")]
    InvalidImage(#[from] image::ImageError),

    /// The request was cancelled before the call was made.
    #[error("cancelled")]
    Cancelled,
}

impl InferenceError {
    /// Whether another attempt could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::MissingImage
            | Self::InvalidResponse(_)
            | Self::InvalidImage(_)
            | Self::Cancelled => false,
        }
    }
}

/// One call to the inference collaborator.
#[derive(Debug, Clone, Copy)]
pub struct TileRequest<'a> {
    /// Text instruction.
    pub instruction: &'a str,
    /// Whole-image context reference.
    pub context: &'a EncodedImage,
    /// The tile crop to enhance.
    pub target: &'a EncodedImage,
    /// Upper bound for this call.
    pub timeout: Duration,
}

/// External per-tile inference service.
///
/// Implementations return the encoded bytes of a replacement image for
/// `request.target`. They are shared across worker threads.
pub trait TileEnhancer: Send + Sync {
    /// Enhance one tile.
    ///
    /// # Errors
    ///
    /// Any [`InferenceError`]; the caller falls back to the original crop.
    fn enhance(&self, request: &TileRequest<'_>) -> std::result::Result<Vec<u8>, InferenceError>;
}

/// Cooperative cancellation shared between a caller and a running request.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A fresh, unraised flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the flag has been raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-request adapter settings.
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    /// JPEG quality of tile crops.
    pub tile_quality: u8,
    /// Timeout handed to each call.
    pub timeout: Duration,
    /// Retries before falling back.
    pub retry: RetryPolicy,
}

/// A tile after inference.
#[derive(Debug, Clone)]
pub struct ProcessedTile {
    /// Tile geometry.
    pub tile: Tile,
    /// Replacement pixels, or the original crop on failure. Always crop-sized.
    pub pixels: RgbaImage,
    /// Whether `pixels` came from the service.
    pub success: bool,
}

/// Crop a tile's padded rectangle out of the canvas.
#[must_use]
pub fn crop_tile(canvas: &RgbaImage, tile: &Tile) -> RgbaImage {
    let r = tile.crop;
    imageops::crop_imm(canvas, r.x, r.y, r.width, r.height).to_image()
}

/// Decode a service response and bring it to the crop's size.
fn decode_result(
    bytes: &[u8],
    width: u32,
    height: u32,
) -> std::result::Result<RgbaImage, InferenceError> {
    let img = image::load_from_memory(bytes)?.to_rgba8();
    if img.dimensions() == (width, height) {
        return Ok(img);
    }
    tracing::debug!(
        got_width = img.width(),
        got_height = img.height(),
        width,
        height,
        "resampling tile result to crop size"
    );
    Ok(imageops::resize(&img, width, height, FilterType::Triangle))
}

/// Owned inputs of one tile call, shareable with a detached call thread.
struct CallInputs {
    context: Arc<EncodedImage>,
    target: Arc<EncodedImage>,
    timeout: Duration,
}

/// Run a single call on a detached thread and wait for it unless cancelled.
fn call_detached(
    enhancer: &Arc<dyn TileEnhancer>,
    inputs: &CallInputs,
    cancel: &CancelFlag,
    tile: &Tile,
) -> std::result::Result<Vec<u8>, InferenceError> {
    let (tx, rx) = mpsc::channel();
    let enhancer = Arc::clone(enhancer);
    let context = Arc::clone(&inputs.context);
    let target = Arc::clone(&inputs.target);
    let timeout = inputs.timeout;

    thread::Builder::new()
        .name(format!("tile-call-{}-{}", tile.row, tile.col))
        .spawn(move || {
            let request = TileRequest {
                instruction: RESTORATION_INSTRUCTION,
                context: &context,
                target: &target,
                timeout,
            };
            // The receiver is gone if the request was cancelled meanwhile.
            let _ = tx.send(enhancer.enhance(&request));
        })
        .map_err(|e| InferenceError::Transport(format!("failed to start tile call: {e}")))?;

    loop {
        match rx.recv_timeout(CANCEL_POLL_INTERVAL) {
            Ok(outcome) => return outcome,
            Err(RecvTimeoutError::Timeout) => {
                if cancel.is_cancelled() {
                    tracing::debug!(row = tile.row, col = tile.col, "abandoning in-flight call");
                    return Err(InferenceError::Cancelled);
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(InferenceError::Transport(
                    "tile call ended without a result".into(),
                ));
            }
        }
    }
}

/// Sleep for `delay`, waking early if `cancel` is raised.
fn sleep_unless_cancelled(delay: Duration, cancel: &CancelFlag) {
    // No deadline means the delay is too long to represent; wait for cancel.
    let deadline = Instant::now().checked_add(delay);
    while !cancel.is_cancelled() {
        let left = deadline.map_or(CANCEL_POLL_INTERVAL, |d| {
            d.saturating_duration_since(Instant::now())
        });
        if left.is_zero() {
            return;
        }
        thread::sleep(left.min(CANCEL_POLL_INTERVAL));
    }
}

/// Run one tile through the collaborator, honoring retries and cancellation.
fn call_with_retry(
    enhancer: &Arc<dyn TileEnhancer>,
    inputs: &CallInputs,
    retry: RetryPolicy,
    cancel: &CancelFlag,
    tile: &Tile,
) -> std::result::Result<RgbaImage, InferenceError> {
    let max_attempts = retry.max_retries.saturating_add(1);
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(InferenceError::Cancelled);
        }
        let outcome = call_detached(enhancer, inputs, cancel, tile).and_then(|bytes| {
            decode_result(&bytes, inputs.target.width, inputs.target.height)
        });
        match outcome {
            Ok(pixels) => return Ok(pixels),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::debug!(
                    row = tile.row,
                    col = tile.col,
                    attempt,
                    error = %e,
                    "tile call failed, retrying"
                );
                sleep_unless_cancelled(retry.delay_after(attempt), cancel);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn process_tile(
    canvas: &RgbaImage,
    tile: &Tile,
    context: &Arc<EncodedImage>,
    enhancer: &Arc<dyn TileEnhancer>,
    opts: &AdapterOptions,
    cancel: &CancelFlag,
) -> Result<ProcessedTile> {
    let start = Instant::now();
    let crop = crop_tile(canvas, tile);
    let inputs = CallInputs {
        context: Arc::clone(context),
        target: Arc::new(codec::encode_jpeg(&crop, opts.tile_quality)?),
        timeout: opts.timeout,
    };

    match call_with_retry(enhancer, &inputs, opts.retry, cancel, tile) {
        Ok(pixels) => {
            tracing::info!(
                row = tile.row,
                col = tile.col,
                elapsed_ms = %start.elapsed().as_millis(),
                "tile enhanced"
            );
            Ok(ProcessedTile {
                tile: tile.clone(),
                pixels,
                success: true,
            })
        }
        Err(e) => {
            if !matches!(e, InferenceError::Cancelled) {
                tracing::warn!(
                    row = tile.row,
                    col = tile.col,
                    error = %e,
                    "tile enhancement failed, using upscaled pixels"
                );
            }
            Ok(ProcessedTile {
                tile: tile.clone(),
                pixels: crop,
                success: false,
            })
        }
    }
}

/// Enhance every tile concurrently and wait for all of them to settle.
///
/// The returned tiles are in the same order as `tiles`. Raising `cancel`
/// makes every worker stop waiting on its call within a poll interval.
///
/// # Errors
///
/// Returns [`Error::Cancelled`] if `cancel` was raised at any point before
/// all tiles settled, [`Error::ThreadPool`] if the worker pool cannot be
/// built, and [`Error::Encode`] if a crop cannot be encoded.
pub fn enhance_tiles(
    canvas: &RgbaImage,
    tiles: &[Tile],
    context: &EncodedImage,
    enhancer: &Arc<dyn TileEnhancer>,
    opts: &AdapterOptions,
    cancel: &CancelFlag,
) -> Result<Vec<ProcessedTile>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(tiles.len().max(1))
        .thread_name(|i| format!("tile-worker-{i}"))
        .build()?;
    let context = Arc::new(context.clone());

    let processed = pool.install(|| {
        tiles
            .par_iter()
            .map(|tile| process_tile(canvas, tile, &context, enhancer, opts, cancel))
            .collect::<Result<Vec<_>>>()
    })?;

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let enhanced = processed.iter().filter(|t| t.success).count();
    tracing::info!(enhanced, total = processed.len(), "all tiles settled");
    Ok(processed)
}
