//! Core upscale engine: runs the full pipeline for one request.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::canvas;
use crate::compositor;
use crate::config::UpscaleConfig;
use crate::context;
use crate::error::{Error, Result};
use crate::grid;
use crate::inference::{self, AdapterOptions, CancelFlag, TileEnhancer};

/// Result of one upscale request.
#[derive(Debug, Clone)]
pub struct UpscaleOutput {
    /// The stitched image, `(w - w%S)*S` by `(h - h%S)*S`.
    pub image: RgbaImage,
    /// Tiles the service enhanced.
    pub tiles_enhanced: usize,
    /// Tiles in the grid.
    pub tiles_total: usize,
}

impl UpscaleOutput {
    /// Whether every tile fell back to upscaled pixels.
    #[must_use]
    pub fn fully_degraded(&self) -> bool {
        self.tiles_enhanced == 0
    }
}

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the processed file.
    pub path: PathBuf,
    /// Whether processing succeeded.
    pub success: bool,
    /// Tiles the service enhanced.
    pub tiles_enhanced: usize,
    /// Tiles in the grid.
    pub tiles_total: usize,
    /// Human-readable status message.
    pub message: String,
}

impl ProcessResult {
    fn failed(path: &Path, message: String) -> Self {
        Self {
            path: path.to_path_buf(),
            success: false,
            tiles_enhanced: 0,
            tiles_total: 0,
            message,
        }
    }
}

/// The upscale engine holding the inference collaborator and configuration.
///
/// Create once with [`UpscaleEngine::new()`] and reuse for many images. The
/// engine keeps no state between requests.
pub struct UpscaleEngine {
    enhancer: Arc<dyn TileEnhancer>,
    config: UpscaleConfig,
}

impl UpscaleEngine {
    /// Create an engine around an inference collaborator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` fails validation.
    pub fn new(enhancer: Arc<dyn TileEnhancer>, config: UpscaleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { enhancer, config })
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &UpscaleConfig {
        &self.config
    }

    /// Smallest accepted source size for this configuration.
    #[must_use]
    pub fn min_source_size(&self) -> (u32, u32) {
        let c = &self.config;
        let min_w = grid::min_source_dim(
            c.scale,
            c.cols,
            c.padding,
            canvas::trim_unit(c.scale, c.cols),
        );
        let min_h = grid::min_source_dim(
            c.scale,
            c.rows,
            c.padding,
            canvas::trim_unit(c.scale, c.rows),
        );
        (min_w, min_h)
    }

    fn check_source_size(&self, width: u32, height: u32) -> Result<()> {
        let (min_width, min_height) = self.min_source_size();
        if width < min_width || height < min_height {
            return Err(Error::SourceTooSmall {
                width,
                height,
                min_width,
                min_height,
            });
        }
        Ok(())
    }

    /// Upscale encoded image bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the bytes are not an image, otherwise as
    /// [`UpscaleEngine::upscale`].
    pub fn upscale_bytes(&self, bytes: &[u8]) -> Result<UpscaleOutput> {
        let source = image::load_from_memory(bytes).map_err(Error::Decode)?;
        self.upscale(&source)
    }

    /// Upscale a decoded image.
    ///
    /// # Errors
    ///
    /// See [`UpscaleEngine::upscale_with_cancel`].
    pub fn upscale(&self, source: &DynamicImage) -> Result<UpscaleOutput> {
        self.upscale_with_cancel(source, &CancelFlag::new())
    }

    /// Upscale a decoded image, abandoning the request if `cancel` is raised.
    ///
    /// Per-tile inference failures never surface here; they only reduce the
    /// number of enhanced tiles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceTooSmall`], [`Error::CanvasTooLarge`],
    /// [`Error::Encode`], [`Error::ThreadPool`] or [`Error::Cancelled`].
    pub fn upscale_with_cancel(
        &self,
        source: &DynamicImage,
        cancel: &CancelFlag,
    ) -> Result<UpscaleOutput> {
        let start = Instant::now();
        let c = &self.config;
        let source = source.to_rgba8();
        self.check_source_size(source.width(), source.height())?;

        let reference = context::build_context(&source, c.context_max_dim, c.context_quality)?;
        let base = canvas::upscale_canvas(&source, c.scale, c.rows, c.cols)?;
        let tiles = grid::partition(base.width(), base.height(), c.rows, c.cols, c.padding);
        tracing::info!(
            source_width = source.width(),
            source_height = source.height(),
            width = base.width(),
            height = base.height(),
            tiles = tiles.len(),
            "upscale started"
        );

        let opts = AdapterOptions {
            tile_quality: c.tile_quality,
            timeout: c.tile_timeout,
            retry: c.retry,
        };
        let processed = inference::enhance_tiles(
            &base,
            &tiles,
            &reference,
            &self.enhancer,
            &opts,
            cancel,
        )?;

        let tiles_enhanced = processed.iter().filter(|t| t.success).count();
        let image = compositor::composite(base, &processed);

        tracing::info!(
            tiles_enhanced,
            tiles_total = processed.len(),
            elapsed_ms = %start.elapsed().as_millis(),
            "upscale finished"
        );

        Ok(UpscaleOutput {
            image,
            tiles_enhanced,
            tiles_total: processed.len(),
        })
    }

    /// Process a single image file: load, upscale, save.
    ///
    /// Returns a [`ProcessResult`] indicating success or failure.
    #[must_use]
    pub fn process_file(&self, input: &Path, output: &Path) -> ProcessResult {
        let source = match image::open(input) {
            Ok(img) => img,
            Err(e) => return ProcessResult::failed(input, format!("Failed to load: {e}")),
        };

        let upscaled = match self.upscale(&source) {
            Ok(out) => out,
            Err(e) => return ProcessResult::failed(input, e.to_string()),
        };

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    return ProcessResult::failed(
                        input,
                        format!("Failed to create output directory: {e}"),
                    );
                }
            }
        }

        if let Err(e) = save_image(&upscaled.image, output) {
            return ProcessResult::failed(input, format!("Failed to save: {e}"));
        }

        let message = if upscaled.fully_degraded() {
            "Upscaled without enhancement (all tiles fell back)".to_string()
        } else {
            format!(
                "Upscaled, {}/{} tiles enhanced",
                upscaled.tiles_enhanced, upscaled.tiles_total
            )
        };

        ProcessResult {
            path: input.to_path_buf(),
            success: true,
            tiles_enhanced: upscaled.tiles_enhanced,
            tiles_total: upscaled.tiles_total,
            message,
        }
    }

    /// Process all supported images in a directory, one request at a time.
    ///
    /// Returns a [`ProcessResult`] for each image found.
    #[must_use]
    pub fn process_directory(&self, input_dir: &Path, output_dir: &Path) -> Vec<ProcessResult> {
        let mut entries: Vec<PathBuf> = match std::fs::read_dir(input_dir) {
            Ok(rd) => rd
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
                .map(|e| e.path())
                .filter(|p| is_supported_image(p))
                .collect(),
            Err(e) => {
                return vec![ProcessResult::failed(
                    input_dir,
                    format!("Failed to read directory: {e}"),
                )];
            }
        };
        entries.sort();

        if !output_dir.exists() {
            if let Err(e) = std::fs::create_dir_all(output_dir) {
                return vec![ProcessResult::failed(
                    output_dir,
                    format!("Failed to create output directory: {e}"),
                )];
            }
        }

        entries
            .iter()
            .filter_map(|input| {
                let name = input.file_name()?;
                Some(self.process_file(input, &output_dir.join(name)))
            })
            .collect()
    }
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// Save an RGBA image with format-specific settings.
///
/// JPEG output drops alpha and is written at quality 95.
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &RgbaImage, path: &Path) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    match format {
        ImageFormat::Jpeg => {
            let encoded = crate::codec::encode_jpeg(img, 95)?;
            std::fs::write(path, encoded.bytes)?;
        }
        ImageFormat::Png | ImageFormat::WebP | ImageFormat::Bmp => {
            img.save_with_format(path, format)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }

    Ok(())
}

/// Generate a default output path from an input path.
///
/// Example: `"photo.jpg"` becomes `"photo_upscaled.png"`. PNG keeps the
/// stitched result lossless.
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}_upscaled.png"))
}
