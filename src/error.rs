//! Error types for the gemini-tiled-upscale crate.
//!
//! Only request-fatal conditions live here. Per-tile inference failures are
//! absorbed by the tile adapter and are described by
//! [`InferenceError`](crate::inference::InferenceError).

/// Errors that abort an upscale request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source image bytes could not be decoded.
    #[error("failed to decode source image: {0}")]
    Decode(#[source] image::ImageError),

    /// The source is too small for the configured grid and padding.
    #[error(
        "source image too small ({width}x{height}); at least {min_width}x{min_height} is required"
    )]
    SourceTooSmall {
        /// Source width in pixels.
        width: u32,
        /// Source height in pixels.
        height: u32,
        /// Smallest accepted source width.
        min_width: u32,
        /// Smallest accepted source height.
        min_height: u32,
    },

    /// The upscaled canvas would exceed the allocation ceiling.
    #[error("upscaled canvas {width}x{height} is too large to allocate")]
    CanvasTooLarge {
        /// Requested canvas width.
        width: u64,
        /// Requested canvas height.
        height: u64,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to encode an image for transmission.
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    /// The per-request worker pool could not be created.
    #[error("failed to build tile worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The HTTP client for the inference service could not be created.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The request was cancelled before all tiles settled.
    #[error("upscale request cancelled")]
    Cancelled,

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred during image processing (load, save).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
