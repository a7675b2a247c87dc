use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gemini_tiled_upscale::gemini::{DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use gemini_tiled_upscale::{
    default_output_path, GeminiClient, GeminiConfig, ProcessResult, RetryPolicy, UpscaleConfig,
    UpscaleEngine,
};

#[derive(Parser)]
#[command(
    name = "gemini-upscale",
    about = "Tiled 3x upscaling with Gemini detail synthesis and seamless blending",
    version,
    after_help = "Simple usage: gemini-upscale <image>  (writes <name>_upscaled.png)\n\n\
                  Tiles that Gemini fails to enhance keep their plain bilinear upscale."
)]
struct Cli {
    /// Input image file or directory
    input: String,

    /// Output file or directory (default: {name}_upscaled.png)
    #[arg(short, long)]
    output: Option<String>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Gemini model name
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Gemini API base URL
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Sampling temperature
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,

    /// Per-tile request timeout in seconds
    #[arg(long, default_value = "120")]
    timeout_secs: u64,

    /// Retries per tile before falling back to plain upscaling
    #[arg(long, default_value = "0")]
    retries: u32,

    /// Base delay between retries in milliseconds (grows linearly)
    #[arg(long, default_value = "500")]
    retry_backoff_ms: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if quiet {
        "error"
    } else if verbose {
        "gemini_tiled_upscale=debug,info"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if !(0.0..=2.0).contains(&cli.temperature) {
        eprintln!("Error: Temperature must be between 0.0 and 2.0");
        process::exit(1);
    }

    let gemini = GeminiConfig {
        api_key: cli.api_key.clone(),
        model: cli.model.clone(),
        endpoint: cli.endpoint.clone(),
        temperature: cli.temperature,
    };
    let client = match GeminiClient::new(gemini) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Fatal: Failed to initialize Gemini client: {e}");
            process::exit(1);
        }
    };

    let config = UpscaleConfig {
        tile_timeout: Duration::from_secs(cli.timeout_secs),
        retry: RetryPolicy {
            max_retries: cli.retries,
            backoff: Duration::from_millis(cli.retry_backoff_ms),
        },
        ..UpscaleConfig::default()
    };
    let engine = match UpscaleEngine::new(Arc::new(client), config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Fatal: Failed to initialize engine: {e}");
            process::exit(1);
        }
    };

    let input_path = Path::new(&cli.input);
    if !input_path.exists() {
        eprintln!("Error: Input path does not exist: {}", cli.input);
        process::exit(1);
    }

    let results = if input_path.is_dir() {
        let output_dir = if let Some(o) = &cli.output {
            PathBuf::from(o)
        } else {
            eprintln!("Error: Output directory is required for batch processing");
            eprintln!("Usage: gemini-upscale <input_dir> -o <output_dir>");
            process::exit(1);
        };
        engine.process_directory(input_path, &output_dir)
    } else {
        let output_path = match &cli.output {
            Some(o) => PathBuf::from(o),
            None => default_output_path(input_path),
        };
        vec![engine.process_file(input_path, &output_path)]
    };

    let mut success_count = 0u32;
    let mut fail_count = 0u32;

    for r in &results {
        print_result(r, cli.quiet);
        if r.success {
            success_count += 1;
        } else {
            fail_count += 1;
        }
    }

    if results.len() > 1 && !cli.quiet {
        eprintln!();
        eprint!("[Summary] Processed: {success_count}");
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

fn print_result(result: &ProcessResult, quiet: bool) {
    let filename = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    if result.success {
        if !quiet {
            eprintln!(
                "[OK] {filename} ({}/{} tiles enhanced)",
                result.tiles_enhanced, result.tiles_total
            );
        }
    } else {
        eprintln!("[FAIL] {filename}: {}", result.message);
    }
}
