//! Gemini `generateContent` client used as the production tile enhancer.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::inference::{InferenceError, TileEnhancer, TileRequest};

/// Default image-capable Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";
/// Public Gemini API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
/// Low temperature keeps the output close to the input crop.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Longest error body kept in an [`InferenceError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Connection settings for [`GeminiClient`].
#[derive(Clone)]
pub struct GeminiConfig {
    /// API key sent as `x-goog-api-key`.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// Base URL, without trailing slash.
    pub endpoint: String,
    /// Sampling temperature.
    pub temperature: f32,
}

impl GeminiConfig {
    /// Defaults for everything but the key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"***REDACTED***")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    inline_data: Option<InlineData>,
}

fn build_request_body<'a>(request: &TileRequest<'a>, temperature: f32) -> GenerateRequest<'a> {
    let engine = base64::engine::general_purpose::STANDARD;
    let inline = |img: &crate::codec::EncodedImage| RequestPart::Inline {
        inline_data: InlineData {
            mime_type: img.mime_type.to_string(),
            data: engine.encode(&img.bytes),
        },
    };

    // Context first, then the target crop.
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                RequestPart::Text {
                    text: request.instruction,
                },
                inline(request.context),
                inline(request.target),
            ],
        }],
        generation_config: GenerationConfig {
            response_modalities: vec!["IMAGE"],
            temperature,
        },
    }
}

/// Pull the first inline image out of a `generateContent` response body.
fn extract_image(body: &str) -> std::result::Result<Vec<u8>, InferenceError> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;

    let data = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().find_map(|p| p.inline_data))
        .map(|d| d.data)
        .filter(|d| !d.is_empty())
        .ok_or(InferenceError::MissingImage)?;

    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| InferenceError::InvalidResponse(format!("bad base64 image data: {e}")))
}

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}

/// Blocking Gemini API client.
pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::blocking::Client,
}

impl GeminiClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpClient`](crate::Error::HttpClient) if the HTTP
    /// client cannot be built.
    pub fn new(mut config: GeminiConfig) -> Result<Self> {
        config.endpoint = config.endpoint.trim_end_matches('/').to_string();
        let client = reqwest::blocking::Client::builder().build()?;
        Ok(Self { config, client })
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.endpoint, self.config.model
        )
    }
}

impl TileEnhancer for GeminiClient {
    fn enhance(&self, request: &TileRequest<'_>) -> std::result::Result<Vec<u8>, InferenceError> {
        let body = build_request_body(request, self.config.temperature);

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.config.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout(request.timeout)
                } else {
                    InferenceError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response.text().map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout(request.timeout)
            } else {
                InferenceError::Transport(e.to_string())
            }
        })?;

        if !status.is_success() {
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body: truncate_body(text),
            });
        }

        extract_image(&text)
    }
}
