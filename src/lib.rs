//! Tiled 3x super-resolution with context-aware Gemini tile enhancement.
//!
//! The source image is trimmed and upscaled into a base canvas, which is cut
//! into a 3x3 grid of heavily overlapping tiles. Each tile is sent to a
//! generative model together with a downscaled copy of the whole image (the
//! "context") so the model knows what it is looking at. The returned tiles are
//! stitched back with linear edge feathering; any tile the model fails on
//! keeps its plain upscaled pixels.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use gemini_tiled_upscale::{GeminiClient, GeminiConfig, UpscaleConfig, UpscaleEngine};
//!
//! let client = GeminiClient::new(GeminiConfig::new("API_KEY")).expect("client");
//! let engine = UpscaleEngine::new(Arc::new(client), UpscaleConfig::default()).expect("engine");
//! let img = image::open("photo.jpg").unwrap();
//! let out = engine.upscale(&img).unwrap();
//! println!("{}/{} tiles enhanced", out.tiles_enhanced, out.tiles_total);
//! out.image.save("photo_upscaled.png").unwrap();
//! ```
//!
//! # Custom collaborators
//!
//! Anything implementing [`TileEnhancer`] can stand in for Gemini, which is
//! how the tests drive the pipeline deterministically.
//!
//! ```no_run
//! use gemini_tiled_upscale::{InferenceError, TileEnhancer, TileRequest};
//!
//! struct Identity;
//!
//! impl TileEnhancer for Identity {
//!     fn enhance(&self, request: &TileRequest<'_>) -> Result<Vec<u8>, InferenceError> {
//!         Ok(request.target.bytes.clone())
//!     }
//! }
//! ```

#![deny(missing_docs)]

pub mod blending;
pub mod canvas;
pub mod codec;
pub mod compositor;
pub mod config;
pub mod context;
mod engine;
pub mod error;
pub mod gemini;
pub mod grid;
pub mod inference;

pub use codec::EncodedImage;
pub use config::{RetryPolicy, UpscaleConfig};
pub use engine::{
    default_output_path, is_supported_image, save_image, ProcessResult, UpscaleEngine,
    UpscaleOutput,
};
pub use error::{Error, Result};
pub use gemini::{GeminiClient, GeminiConfig};
pub use grid::{Insets, Rect, Tile};
pub use inference::{CancelFlag, InferenceError, ProcessedTile, TileEnhancer, TileRequest};
