//! Shared fixtures for unit and handler tests.

use crate::config::{Config, CorsConfig, LlmConfig, StorageConfig};
use crate::extraction::ExtractionError;
use crate::ocr::TextRecognizer;
use async_trait::async_trait;
use axum_test::TestServer;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use url::Url;
use wiremock::MockServer;

/// Recognizer that returns fixed text (or always fails) without touching a system binary.
#[derive(Debug, Clone)]
pub struct StaticRecognizer {
    text: Option<String>,
}

impl StaticRecognizer {
    pub fn new(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { text: None }
    }
}

#[async_trait]
impl TextRecognizer for StaticRecognizer {
    async fn recognize(&self, _image: &Path) -> Result<String, ExtractionError> {
        self.text.clone().ok_or_else(|| ExtractionError::ToolFailed {
            program: "tesseract".to_string(),
            code: 1,
            detail: "simulated failure".to_string(),
        })
    }
}

/// A chat completion response whose first choice carries `content`.
pub fn completion_body(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 120, "completion_tokens": 24, "total_tokens": 144}
    })
}

/// Config pointing storage at `storage_dir` and the model API at `llm`.
pub fn create_test_config(storage_dir: &Path, llm: &MockServer) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        storage: StorageConfig {
            dir: storage_dir.to_path_buf(),
            ..Default::default()
        },
        llm: LlmConfig {
            api_key: Some("sk-test".to_string()),
            base_url: Url::parse(&format!("{}/v1", llm.uri())).expect("mock server URI is a valid URL"),
            ..Default::default()
        },
        cors: CorsConfig::default(),
        ..Default::default()
    }
}

pub async fn create_test_app(storage_dir: &Path, llm: &MockServer, recognizer: StaticRecognizer) -> TestServer {
    create_test_app_with_config(create_test_config(storage_dir, llm), recognizer).await
}

pub async fn create_test_app_with_config(config: Config, recognizer: StaticRecognizer) -> TestServer {
    crate::Application::with_recognizer(config, Arc::new(recognizer))
        .await
        .expect("Failed to create application")
        .into_test_server()
}
