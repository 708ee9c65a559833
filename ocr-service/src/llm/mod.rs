//! OpenAI-compatible chat completions client.
//!
//! Two calls are made against `{base_url}/chat/completions`, both in JSON mode at temperature 0:
//!
//! - [`LlmClient::parse_text`]: a text model turns OCR output into the requested fields.
//! - [`LlmClient::read_image`]: a vision model transcribes an image and extracts the fields in
//!   one go, answering with `{"raw_text": ..., "fields": {...}}`.
//!
//! Request bodies are plain JSON; responses are decoded with the `async-openai` wire types.

pub mod prompts;

use async_openai::types::chat::CreateChatCompletionResponse;
use base64::{Engine, engine::general_purpose::STANDARD};
use indexmap::IndexMap;
use reqwest::Client;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, error, instrument};
use url::Url;

use crate::config::LlmConfig;
use crate::extraction::ExtractionError;
use crate::fields::{NormalizedField, select_fields};

/// An image ready to be sent inline to a vision model.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl InlineImage {
    fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}

/// Text plus fields returned by the vision model.
#[derive(Debug, Clone, PartialEq)]
pub struct VisionReading {
    pub raw_text: String,
    pub fields: IndexMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct LlmClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    text_model: String,
    vision_model: String,
    vision_max_tokens: u32,
    image_detail: String,
    request_timeout: Duration,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self, ExtractionError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            text_model: config.text_model.clone(),
            vision_model: config.vision_model.clone(),
            vision_max_tokens: config.vision_max_tokens,
            image_detail: config.image_detail.clone(),
            request_timeout: config.request_timeout,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Ask the text model to extract `fields` from `ocr_text`.
    #[instrument(skip_all, fields(model = %self.text_model, text_len = ocr_text.len(), fields = fields.len()), err)]
    pub async fn parse_text(&self, ocr_text: &str, fields: &[NormalizedField]) -> Result<IndexMap<String, Value>, ExtractionError> {
        let body = json!({
            "model": self.text_model,
            "messages": [
                {"role": "user", "content": prompts::text_extraction(ocr_text, fields)}
            ],
            "response_format": {"type": "json_object"},
            "temperature": 0,
        });

        let returned = self.complete(body).await?;
        Ok(select_fields(fields, &returned))
    }

    /// Send `image` to the vision model, which transcribes it and extracts `fields`.
    #[instrument(skip_all, fields(model = %self.vision_model, mime = %image.mime_type, bytes = image.bytes.len()), err)]
    pub async fn read_image(&self, image: &InlineImage, fields: &[NormalizedField]) -> Result<VisionReading, ExtractionError> {
        let body = json!({
            "model": self.vision_model,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": prompts::vision_extraction(fields)},
                    {
                        "type": "image_url",
                        "image_url": {"url": image.data_url(), "detail": self.image_detail}
                    }
                ]
            }],
            "response_format": {"type": "json_object"},
            "max_tokens": self.vision_max_tokens,
            "temperature": 0,
        });

        let mut returned = self.complete(body).await?;

        let raw_text = match returned.remove("raw_text") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
        };
        let extracted = match returned.remove("fields") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(ExtractionError::ModelOutput(format!(
                    "expected \"fields\" to be an object, got {other}"
                )));
            }
        };

        Ok(VisionReading {
            raw_text,
            fields: select_fields(fields, &extracted),
        })
    }

    /// POST a chat completion and parse the first choice's content as a JSON object.
    async fn complete(&self, body: Value) -> Result<Map<String, Value>, ExtractionError> {
        let api_key = self.api_key.as_deref().ok_or(ExtractionError::MissingApiKey)?;
        let url = ensure_slash(&self.base_url)
            .join("chat/completions")
            .map_err(|e| ExtractionError::ModelOutput(format!("invalid model API URL: {e}")))?;

        debug!(%url, "Sending chat completion request");
        let response = self
            .client
            .post(url.clone())
            .bearer_auth(api_key)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%url, %status, "Model API request failed");
            return Err(ExtractionError::ModelApi {
                status: status.as_u16(),
                body,
            });
        }

        let body_text = response.text().await?;
        let completion: CreateChatCompletionResponse = serde_json::from_str(&body_text).map_err(|e| {
            error!(error = %e, "Failed to decode chat completion response");
            ExtractionError::ModelOutput(format!("malformed completion response: {e}"))
        })?;

        if let Some(usage) = &completion.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat completion finished"
            );
        }

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ExtractionError::EmptyResponse)?;

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(ExtractionError::ModelOutput(format!("expected a JSON object, got {other}"))),
            Err(e) => Err(ExtractionError::ModelOutput(format!("response is not valid JSON: {e}"))),
        }
    }
}

/// Makes sure a url has a trailing slash, so `join` appends rather than replaces the last segment.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let path = format!("{}/", url.path());
        new_url.set_path(&path);
        new_url
    }
}
