//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `OCR_SERVICE_CONFIG`
//! environment variable. A missing file is not an error: every field has a default.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **Defaults** - see the `Default` implementations below
//! 2. **YAML config file** - Base configuration (default: `config.yaml`)
//! 3. **Environment variables** - Variables prefixed with `OCR_` override YAML values
//! 4. **Well-known variables** - `PORT`, `OPENAI_API_KEY` and `OPENAI_BASE_URL`
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `OCR_LLM__TEXT_MODEL=gpt-4o` sets the `llm.text_model` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use ocr_service::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! PORT=8080
//!
//! # API key for the outbound model calls
//! OPENAI_API_KEY=sk-...
//!
//! # Override nested values
//! OCR_STORAGE__DIR=/var/lib/ocr-service
//! OCR_OCR__LANGUAGES='[eng]'
//! OCR_ENABLE_METRICS=true
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "OCR_SERVICE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have defaults matching a local development setup, so an empty config file (or none
/// at all) yields a runnable service once `OPENAI_API_KEY` is set.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Upload storage settings
    pub storage: StorageConfig,
    /// Local OCR engine settings
    pub ocr: OcrConfig,
    /// Outbound language model settings
    pub llm: LlmConfig,
    /// CORS settings
    pub cors: CorsConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Where uploads go and what is accepted.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory uploads are written to (created on startup)
    pub dir: PathBuf,
    /// Maximum upload size in bytes (default: 10MB)
    pub max_file_size: u64,
    /// Accepted file extensions, lower-case with leading dot
    pub allowed_extensions: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("storage"),
            max_file_size: 10 * 1024 * 1024, // 10MB
            allowed_extensions: [".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".webp", ".pdf"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl StorageConfig {
    /// Whether `extension` (with leading dot, any case) is on the allow-list
    pub fn is_allowed(&self, extension: &str) -> bool {
        let extension = extension.to_lowercase();
        self.allowed_extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&extension))
    }
}

/// Tesseract and pdftoppm invocation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OcrConfig {
    /// Path or name of the tesseract executable
    pub tesseract_path: String,
    /// Tesseract language packs, joined with `+` on the command line
    pub languages: Vec<String>,
    /// Path or name of the pdftoppm executable (poppler-utils)
    pub pdftoppm_path: String,
    /// Resolution used when rasterizing PDF pages
    pub pdf_dpi: u32,
    /// Upper bound for a single external process run
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: "tesseract".to_string(),
            languages: vec!["tur".to_string(), "eng".to_string()],
            pdftoppm_path: "pdftoppm".to_string(),
            pdf_dpi: 300,
            timeout: Duration::from_secs(120),
        }
    }
}

/// OpenAI-compatible chat completions settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    /// Bearer token for the model API. Usually supplied via `OPENAI_API_KEY`.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL up to and including the version segment
    pub base_url: Url,
    /// Model used to parse OCR text into fields
    pub text_model: String,
    /// Vision model used for the single-step image path
    pub vision_model: String,
    /// Completion token cap for vision requests
    pub vision_max_tokens: u32,
    /// Image detail hint sent with vision requests ("low", "high" or "auto")
    pub image_detail: String,
    /// Timeout for a single model request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: Url::parse("https://api.openai.com/v1").expect("static URL is valid"),
            text_model: "gpt-4o-mini".to_string(),
            vision_model: "gpt-4o".to_string(),
            vision_max_tokens: 4096,
            image_detail: "high".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// CORS configuration. `"*"` allows any origin.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            storage: StorageConfig::default(),
            ocr: OcrConfig::default(),
            llm: LlmConfig::default(),
            cors: CorsConfig::default(),
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.storage.dir.as_os_str().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: storage.dir cannot be empty".to_string(),
            });
        }

        if self.storage.max_file_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: storage.max_file_size must be greater than 0".to_string(),
            });
        }

        if self.storage.allowed_extensions.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: storage.allowed_extensions cannot be empty".to_string(),
            });
        }

        if let Some(bad) = self.storage.allowed_extensions.iter().find(|ext| !ext.starts_with('.') || ext.len() < 2) {
            return Err(Error::Internal {
                operation: format!("Config validation: invalid extension '{bad}' in storage.allowed_extensions (expected e.g. '.png')"),
            });
        }

        if self.ocr.languages.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: ocr.languages cannot be empty".to_string(),
            });
        }

        if self.ocr.pdf_dpi == 0 {
            return Err(Error::Internal {
                operation: "Config validation: ocr.pdf_dpi must be greater than 0".to_string(),
            });
        }

        if self.llm.text_model.trim().is_empty() || self.llm.vision_model.trim().is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: llm.text_model and llm.vision_model cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("OCR_").ignore(&["service_config"]).split("__"))
            .merge(Env::raw().only(&["PORT"]))
            .merge(Env::raw().only(&["OPENAI_API_KEY"]).map(|_| "llm.api_key".into()))
            .merge(Env::raw().only(&["OPENAI_BASE_URL"]).map(|_| "llm.base_url".into()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
