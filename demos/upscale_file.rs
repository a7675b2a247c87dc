//! Upscale a single image with Gemini.
//!
//! Usage:
//! ```sh
//! GEMINI_API_KEY=... cargo run --example upscale_file -- input.jpg output.png
//! ```

use std::env;
use std::process;
use std::sync::Arc;

use gemini_tiled_upscale::{GeminiClient, GeminiConfig, UpscaleConfig, UpscaleEngine};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <input> <output>", args[0]);
        process::exit(1);
    }

    let Ok(api_key) = env::var("GEMINI_API_KEY") else {
        eprintln!("Error: GEMINI_API_KEY is not set");
        process::exit(1);
    };

    let client = match GeminiClient::new(GeminiConfig::new(api_key)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: failed to build client: {e}");
            process::exit(1);
        }
    };
    let engine = match UpscaleEngine::new(Arc::new(client), UpscaleConfig::default()) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: failed to initialize engine: {e}");
            process::exit(1);
        }
    };
    let result = engine.process_file(args[1].as_ref(), args[2].as_ref());

    if result.success {
        println!("Done: {}", result.message);
    } else {
        eprintln!("Error: {}", result.message);
        process::exit(1);
    }
}
