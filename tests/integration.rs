use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gemini_tiled_upscale::{
    canvas, CancelFlag, Error, InferenceError, TileEnhancer, TileRequest, UpscaleConfig,
    UpscaleEngine,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

fn png_bytes(img: &RgbaImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

#[allow(clippy::cast_possible_truncation)]
fn source(w: u32, h: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
    }))
}

struct AlwaysFails;

impl TileEnhancer for AlwaysFails {
    fn enhance(&self, _: &TileRequest<'_>) -> Result<Vec<u8>, InferenceError> {
        Err(InferenceError::Transport("connection reset".into()))
    }
}

/// Inverts the decoded target crop.
struct Invert {
    calls: AtomicUsize,
}

impl TileEnhancer for Invert {
    fn enhance(&self, request: &TileRequest<'_>) -> Result<Vec<u8>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut img = image::load_from_memory(&request.target.bytes)?.to_rgba8();
        for px in img.pixels_mut() {
            px[0] = 255 - px[0];
            px[1] = 255 - px[1];
            px[2] = 255 - px[2];
        }
        Ok(png_bytes(&img))
    }
}

/// Solid magenta, the size of the target.
struct Magenta;

impl TileEnhancer for Magenta {
    fn enhance(&self, request: &TileRequest<'_>) -> Result<Vec<u8>, InferenceError> {
        Ok(png_bytes(&RgbaImage::from_pixel(
            request.target.width,
            request.target.height,
            Rgba([255, 0, 255, 255]),
        )))
    }
}

fn engine(enhancer: impl TileEnhancer + 'static) -> UpscaleEngine {
    UpscaleEngine::new(Arc::new(enhancer), UpscaleConfig::default()).unwrap()
}

#[test]
fn output_dimensions_follow_trim_then_scale() {
    let engine = engine(AlwaysFails);
    for (w, h) in [(300, 300), (301, 200), (200, 302), (250, 170)] {
        let out = engine.upscale(&source(w, h)).unwrap();
        assert_eq!(
            out.image.dimensions(),
            ((w - w % 3) * 3, (h - h % 3) * 3),
            "source {w}x{h}"
        );
    }
}

#[test]
fn all_failures_degrade_to_base_canvas() {
    let src = source(300, 300);
    let out = engine(AlwaysFails).upscale(&src).unwrap();

    let base = canvas::upscale_canvas(&src.to_rgba8(), 3, 3, 3).unwrap();
    assert!(out.fully_degraded());
    assert_eq!(out.tiles_total, 9);
    assert_eq!(out.image, base);
}

#[test]
fn reference_scenario_enhances_all_nine_tiles() {
    let invert = Arc::new(Invert {
        calls: AtomicUsize::new(0),
    });
    let engine = UpscaleEngine::new(invert.clone(), UpscaleConfig::default()).unwrap();
    let out = engine.upscale(&source(300, 300)).unwrap();

    assert_eq!(invert.calls.load(Ordering::SeqCst), 9);
    assert_eq!(out.image.dimensions(), (900, 900));
    assert_eq!(out.tiles_enhanced, 9);
    assert_eq!(out.tiles_total, 9);
}

#[test]
fn successful_tiles_replace_base_pixels() {
    let src = source(600, 600);
    let out = engine(Magenta).upscale(&src).unwrap();
    assert_eq!(out.tiles_enhanced, 9);

    // Canvas 1800x1800, tiles 600, padding 160. Sample tile cores away from
    // any neighbor's feathered band.
    for (x, y) in [(100, 100), (900, 900), (1700, 1700), (900, 50), (50, 900)] {
        assert_eq!(out.image.get_pixel(x, y), &Rgba([255, 0, 255, 255]));
    }
}

#[test]
fn repeated_runs_are_identical() {
    let src = source(330, 240);
    let a = engine(Invert {
        calls: AtomicUsize::new(0),
    })
    .upscale(&src)
    .unwrap();
    let b = engine(Invert {
        calls: AtomicUsize::new(0),
    })
    .upscale(&src)
    .unwrap();
    assert_eq!(a.image, b.image);
}

#[test]
fn too_small_source_is_rejected() {
    let err = engine(AlwaysFails).upscale(&source(120, 400)).unwrap_err();
    assert!(matches!(err, Error::SourceTooSmall { .. }));
}

#[test]
fn cancelled_request_returns_error() {
    let flag = CancelFlag::new();
    flag.cancel();
    let err = engine(Magenta)
        .upscale_with_cancel(&source(300, 300), &flag)
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

/// Takes far longer than any caller should have to wait after cancelling.
struct Sluggish;

impl TileEnhancer for Sluggish {
    fn enhance(&self, request: &TileRequest<'_>) -> Result<Vec<u8>, InferenceError> {
        std::thread::sleep(Duration::from_millis(1500));
        Magenta.enhance(request)
    }
}

#[test]
fn cancelling_mid_request_returns_promptly() {
    let flag = CancelFlag::new();
    let remote = flag.clone();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        remote.cancel();
    });

    let start = Instant::now();
    let err = engine(Sluggish)
        .upscale_with_cancel(&source(300, 300), &flag)
        .unwrap_err();
    canceller.join().unwrap();

    assert!(matches!(err, Error::Cancelled));
    assert!(start.elapsed() < Duration::from_millis(1000), "{:?}", start.elapsed());
}

#[test]
fn process_file_writes_upscaled_png() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("photo.png");
    source(200, 200).save(&input).unwrap();
    let output = dir.path().join("out").join("photo_upscaled.png");

    let result = engine(AlwaysFails).process_file(&input, &output);
    assert!(result.success, "{}", result.message);
    assert_eq!(result.tiles_enhanced, 0);
    assert_eq!(result.tiles_total, 9);

    let written = image::open(&output).unwrap();
    assert_eq!((written.width(), written.height()), (594, 594));
}

#[test]
fn process_file_reports_load_failure() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.png");
    std::fs::write(&input, b"not a png").unwrap();

    let result = engine(AlwaysFails).process_file(&input, &dir.path().join("x.png"));
    assert!(!result.success);
    assert!(result.message.contains("Failed to load"));
}

#[test]
fn process_directory_handles_only_images() {
    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("in");
    std::fs::create_dir(&input_dir).unwrap();
    source(180, 180).save(input_dir.join("a.png")).unwrap();
    source(180, 180).save(input_dir.join("b.bmp")).unwrap();
    std::fs::write(input_dir.join("notes.txt"), "skip me").unwrap();

    let output_dir = dir.path().join("out");
    let results = engine(AlwaysFails).process_directory(&input_dir, &output_dir);

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success));
    assert!(output_dir.join("a.png").exists());
    assert!(output_dir.join("b.bmp").exists());
}
