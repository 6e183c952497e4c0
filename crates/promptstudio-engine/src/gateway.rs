use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use promptstudio_contracts::prompt::{FieldKey, StructuredPrompt};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::config::{GenerationMode, StudioConfig};

/// Shown whenever a render cannot produce an image.
pub const PLACEHOLDER_IMAGE_URL: &str = "https://images.unsplash.com/photo-1618005182384-a83a8bd57fbe?auto=format&fit=crop&q=80&w=1200";
pub const DEFAULT_ASPECT_RATIO: &str = "1:1";

const RETRY_BACKOFF: Duration = Duration::from_millis(1200);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub prompt: String,
    pub aspect_ratio: String,
    pub image_size: Option<String>,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            image_size: None,
        }
    }
}

pub trait TextGateway: Send + Sync {
    fn name(&self) -> &str;
    fn optimize_structured(&self, raw: &str) -> Result<StructuredPrompt>;
}

pub trait ImageGateway: Send + Sync {
    fn name(&self) -> &str;
    /// Returns an image URL: `https://`, `data:` or a file URI.
    fn generate_image(&self, request: &ImageRequest) -> Result<String>;
}

/// Both halves of a generation backend.
pub trait Gateway: TextGateway + ImageGateway {}

impl<T: TextGateway + ImageGateway> Gateway for T {}

/// Refines `raw` through `gateway`. Failures degrade to an empty record.
///
/// Standalone entry point for callers without a [`StudioEngine`]. The
/// engine takes the raw `Result` in `finish_optimize` instead, so it can log
/// the failure as an error entry before applying the same empty fallback.
///
/// [`StudioEngine`]: crate::studio::StudioEngine
pub fn optimize_structured<G: TextGateway + ?Sized>(gateway: &G, raw: &str) -> StructuredPrompt {
    match gateway.optimize_structured(raw) {
        Ok(prompt) => prompt,
        Err(err) => {
            tracing::warn!(
                gateway = gateway.name(),
                error = %format!("{err:#}"),
                "optimize failed; using empty result"
            );
            StructuredPrompt::new()
        }
    }
}

pub fn gateway_from_config(config: &StudioConfig) -> Result<Box<dyn Gateway>> {
    match config.generation {
        GenerationMode::Simulated => Ok(Box::new(SimulatedGateway::new(config.simulated_delay))),
        GenerationMode::Live => Ok(Box::new(GeminiGateway::new(config)?)),
    }
}

/// Offline backend: fixed delay, placeholder image, no text refinement.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    delay: Duration,
}

impl SimulatedGateway {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl TextGateway for SimulatedGateway {
    fn name(&self) -> &str {
        "simulated"
    }

    fn optimize_structured(&self, _raw: &str) -> Result<StructuredPrompt> {
        Ok(StructuredPrompt::new())
    }
}

impl ImageGateway for SimulatedGateway {
    fn name(&self) -> &str {
        "simulated"
    }

    fn generate_image(&self, request: &ImageRequest) -> Result<String> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        Ok(format!(
            "{PLACEHOLDER_IMAGE_URL}&sig={}",
            prompt_signature(&request.prompt)
        ))
    }
}

/// First 16 hex chars of the prompt's SHA-256.
pub fn prompt_signature(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    hex::encode(digest)[..16].to_string()
}

pub struct GeminiGateway {
    api_base: String,
    api_key: String,
    text_model: String,
    image_model: String,
    image_retries: u8,
    http: HttpClient,
}

impl GeminiGateway {
    pub fn new(config: &StudioConfig) -> Result<Self> {
        let Some(api_key) = config.api_key.clone() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
            image_retries: config.image_retries,
            http,
        })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn optimize_payload(raw: &str) -> Value {
        let properties = FieldKey::ALL
            .iter()
            .map(|key| (key.as_str().to_string(), json!({ "type": "STRING" })))
            .collect::<Map<String, Value>>();
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": optimize_instruction(raw) }],
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": properties,
                },
            },
        })
    }

    fn image_payload(request: &ImageRequest) -> Value {
        let mut image_config = Map::new();
        image_config.insert(
            "aspectRatio".to_string(),
            Value::String(request.aspect_ratio.clone()),
        );
        if let Some(size) = request
            .image_size
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            image_config.insert("imageSize".to_string(), Value::String(size.to_string()));
        }
        json!({
            "contents": [{
                "role": "user",
                "parts": [{
                    "text": format!(
                        "Professional fine art photography: {}. High resolution, masterpiece texture.",
                        request.prompt
                    ),
                }],
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": Value::Object(image_config),
            },
        })
    }

    fn post_with_transport_retries(
        &self,
        endpoint: &str,
        payload: &Value,
        max_retries: u8,
    ) -> Result<HttpResponse> {
        let mut attempt = 0u8;
        loop {
            let response = self
                .http
                .post(endpoint)
                .query(&[("key", self.api_key.as_str())])
                .json(payload)
                .send();

            match response {
                Ok(ok) => return Ok(ok),
                Err(raw) => {
                    let err = anyhow::Error::new(raw)
                        .context(format!("Gemini request failed ({endpoint})"));
                    if !is_retryable_transport_error(&err) || attempt >= max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries,
                        "Gemini transport retry after transient request failure"
                    );
                    thread::sleep(RETRY_BACKOFF * u32::from(attempt));
                }
            }
        }
    }
}

impl TextGateway for GeminiGateway {
    fn name(&self) -> &str {
        "gemini"
    }

    fn optimize_structured(&self, raw: &str) -> Result<StructuredPrompt> {
        let endpoint = self.endpoint_for_model(&self.text_model);
        let response = self.post_with_transport_retries(&endpoint, &Self::optimize_payload(raw), 0)?;
        let payload = response_json_or_error("Gemini", response)?;
        let text = extract_text(&payload);
        if text.trim().is_empty() {
            return Ok(StructuredPrompt::new());
        }
        let parsed: Value = serde_json::from_str(text.trim())
            .context("Gemini returned a non-JSON optimize result")?;
        Ok(StructuredPrompt::from_json_lenient(&parsed))
    }
}

impl ImageGateway for GeminiGateway {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_image(&self, request: &ImageRequest) -> Result<String> {
        let endpoint = self.endpoint_for_model(&self.image_model);
        let response = self.post_with_transport_retries(
            &endpoint,
            &Self::image_payload(request),
            self.image_retries,
        )?;
        let payload = response_json_or_error("Gemini", response)?;
        extract_image_url(&payload)
    }
}

fn optimize_instruction(raw: &str) -> String {
    format!(
        "你是一个专业的 AI 视觉艺术专家，深谙东方美学与高端摄影。请将以下提示词片段，优化为更具意境、专业摄影感的结构化配置。\n\n\
         原始输入: {raw}\n\n\
         要求：\n\
         1. 严格按照 JSON 格式返回。\n\
         2. 提升 subject 的描述深度，确保人物形象气质符合 25 岁左右的精致东方人。\n\
         3. 排除任何欧美或日本风格元素。\n\
         4. 补充 lighting 和 cameraSettings 字段以增强中大画幅摄影质感。\n\
         5. 保持英文描述。"
    )
}

fn candidate_parts(payload: &Value) -> Vec<Value> {
    payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn extract_text(payload: &Value) -> String {
    candidate_parts(payload)
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("")
}

fn extract_image_url(payload: &Value) -> Result<String> {
    for part in candidate_parts(payload) {
        let inline = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object);
        if let Some(inline) = inline {
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            BASE64
                .decode(data.as_bytes())
                .context("Gemini image base64 decode failed")?;
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            return Ok(format!("data:{mime_type};base64,{data}"));
        }
        if let Some(uri) = part
            .get("fileData")
            .or_else(|| part.get("file_data"))
            .and_then(|file| file.get("fileUri").or_else(|| file.get("file_uri")))
            .and_then(Value::as_str)
        {
            return Ok(uri.to_string());
        }
    }
    bail!("No image data returned from model")
}

/// Splits a `data:<mime>;base64,<payload>` URL into mime type and bytes.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>)> {
    let Some(rest) = url.strip_prefix("data:") else {
        bail!("not a data URL");
    };
    let Some((header, data)) = rest.split_once(',') else {
        bail!("data URL has no payload");
    };
    let Some(mime_type) = header.strip_suffix(";base64") else {
        bail!("data URL is not base64 encoded");
    };
    let bytes = BASE64
        .decode(data.trim().as_bytes())
        .context("data URL base64 decode failed")?;
    Ok((mime_type.to_string(), bytes))
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn is_retryable_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .map(|reqwest_err| {
                reqwest_err.is_timeout() || reqwest_err.is_connect() || reqwest_err.is_request()
            })
            .unwrap_or(false)
    })
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out = text.chars().take(max_chars).collect::<String>();
    out.push('…');
    out
}
