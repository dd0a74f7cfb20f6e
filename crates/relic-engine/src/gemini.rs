use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use relic_contracts::models::ModelSpec;
use relic_contracts::request::ContentPart;
use relic_contracts::service::GenerativeService;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::{Credential, RelicConfig};
use crate::truncate_text;

const API_KEY_HEADER: &str = "x-goog-api-key";
const CATALOG_PAGE_SIZE: u32 = 100;
const CATALOG_MAX_PAGES: usize = 50;

/// Blocking client for the Generative Language REST API.
///
/// No request timeout is set here; the call blocks for as long as the service
/// takes to answer.
pub struct GeminiClient {
    api_base: String,
    api_key: Credential,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(config: &RelicConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(None::<Duration>)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            api_base: config.api_base.clone(),
            api_key: config.credential.clone(),
            http,
        })
    }

    pub fn api_base(&self) -> &str {
        self.api_base.as_str()
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

    fn models_endpoint(&self) -> String {
        format!("{}/models", self.api_base)
    }
}

impl GenerativeService for GeminiClient {
    fn generate_content(&self, model: &str, contents: &[ContentPart]) -> Result<String> {
        let endpoint = self.endpoint_for_model(model);
        let payload = build_payload(contents);
        info!(model, parts = contents.len(), "sending generateContent request");

        let response = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, self.api_key.expose())
            .json(&payload)
            .send()
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Gemini", response)?;
        extract_response_text(&response_payload)
    }

    fn list_models(&self) -> Result<Vec<ModelSpec>> {
        let endpoint = self.models_endpoint();
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 0..CATALOG_MAX_PAGES {
            let mut request = self
                .http
                .get(&endpoint)
                .header(API_KEY_HEADER, self.api_key.expose())
                .query(&[("pageSize", CATALOG_PAGE_SIZE.to_string())]);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }
            let response = request
                .send()
                .map_err(reqwest::Error::without_url)
                .with_context(|| format!("Gemini model listing failed ({endpoint})"))?;
            let payload = response_json_or_error("Gemini model listing", response)?;
            let (batch, next) = parse_catalog_page(&payload);
            debug!(page, listed = batch.len(), "fetched model catalog page");
            models.extend(batch);

            match next {
                Some(token) if page_token.as_deref() != Some(token.as_str()) => {
                    page_token = Some(token);
                }
                _ => return Ok(models),
            }
        }
        warn!(
            pages = CATALOG_MAX_PAGES,
            listed = models.len(),
            "model catalog truncated at page limit"
        );
        Ok(models)
    }
}

/// Request body for `generateContent`, keeping the content order.
///
/// Empty text blocks are left out of the wire payload: the service rejects
/// text parts with no characters.
pub(crate) fn build_payload(contents: &[ContentPart]) -> Value {
    let parts: Vec<Value> = contents
        .iter()
        .filter_map(|part| match part {
            ContentPart::Image(image) => Some(json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": BASE64.encode(&image.data),
                }
            })),
            ContentPart::Text(text) if text.is_empty() => None,
            ContentPart::Text(text) => Some(json!({ "text": text })),
        })
        .collect();
    json!({
        "contents": [{
            "role": "user",
            "parts": parts,
        }]
    })
}

/// Concatenated text of the first candidate.
pub(crate) fn extract_response_text(payload: &Value) -> Result<String> {
    let Some(candidate) = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
    else {
        if let Some(reason) = payload
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
        {
            bail!("Gemini blocked the prompt (reason: {reason})");
        }
        bail!("Gemini returned no candidates");
    };

    let text: String = candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate
            .get("finishReason")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        bail!("Gemini returned no text (finish reason: {reason})");
    }
    Ok(text)
}

/// One page of `models.list`: the models plus the next page token.
pub(crate) fn parse_catalog_page(payload: &Value) -> (Vec<ModelSpec>, Option<String>) {
    let models = payload
        .get("models")
        .and_then(Value::as_array)
        .map(|rows| rows.iter().filter_map(model_spec_from_catalog).collect())
        .unwrap_or_default();
    let next = payload
        .get("nextPageToken")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    (models, next)
}

fn model_spec_from_catalog(row: &Value) -> Option<ModelSpec> {
    let name = row.get("name").and_then(Value::as_str)?.trim();
    if name.is_empty() {
        return None;
    }
    Some(ModelSpec {
        name: name.to_string(),
        display_name: row
            .get("displayName")
            .and_then(Value::as_str)
            .map(str::to_string),
        capabilities: row
            .get("supportedGenerationMethods")
            .and_then(Value::as_array)
            .map(|methods| {
                methods
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        input_token_limit: row.get("inputTokenLimit").and_then(Value::as_u64),
    })
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
