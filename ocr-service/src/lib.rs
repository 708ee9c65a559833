//! # ocr-service: structured field extraction from documents
//!
//! An HTTP service that stores uploaded images and PDFs and extracts caller-described fields
//! from them, either by running a local OCR engine and letting a language model parse the text,
//! or by sending the image straight to a vision model.
//!
//! ## Endpoints
//!
//! - `GET /health`: liveness
//! - `POST /file-upload`: multipart upload, returns a `file_id`
//! - `POST /ocr`: `{file_id, ocr, fields}` in, `{file_id, ocr, result, raw_ocr}` out
//! - `GET /api-docs/openapi.json` and `GET /docs`: API documentation
//! - `GET /internal/metrics`: Prometheus metrics, when `enable_metrics` is set
//!
//! ## Request flow
//!
//! ```text
//!  POST /file-upload ──► FileStore::save ──► {dir}/{file_id}_{name}
//!
//!  POST /ocr ──► FileStore::resolve ──► FieldSpec::normalize ──► Extractor::process
//!                                                                 ├─ easyocr: tesseract ─► text model
//!                                                                 └─ llm_ocr: vision model
//! ```
//!
//! ## Running
//!
//! ```bash
//! OPENAI_API_KEY=sk-... ocr-service -f config.yaml
//! ```
//!
//! See [`config`] for the full set of options and environment overrides.

pub mod api;
pub mod config;
pub mod errors;
pub mod extraction;
pub mod fields;
pub mod llm;
pub mod ocr;
mod openapi;
pub mod storage;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use crate::{
    extraction::Extractor,
    llm::LlmClient,
    ocr::{TesseractCli, TextRecognizer, pdf::PdfRasterizer},
    openapi::ApiDoc,
    storage::FileStore,
};
use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// Headroom above `max_file_size` for multipart boundaries and part headers.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared state handed to every handler.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .store(Arc::new(store))
///     .extractor(Arc::new(extractor))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<FileStore>,
    pub extractor: Arc<Extractor>,
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if config.cors.allowed_origins.iter().any(|origin| origin == "*") {
        return Ok(cors.allow_origin(Any));
    }

    let origins = config
        .cors
        .allowed_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cors.allow_origin(origins))
}

/// Build the application router with all endpoints and middleware.
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let body_limit = usize::try_from(state.config.storage.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let router = Router::new()
        .route("/health", get(api::handlers::health::health))
        .route(
            "/file-upload",
            post(api::handlers::files::upload_file).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/ocr", post(api::handlers::ocr::run_ocr))
        .with_state(state.clone())
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let mut router = router.layer(create_cors_layer(&state.config)?);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create the application with the Tesseract-backed recognizer.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let recognizer = Arc::new(TesseractCli::new(&config.ocr));
        Self::with_recognizer(config, recognizer).await
    }

    /// Create the application around a caller-supplied text recognizer.
    pub async fn with_recognizer(config: Config, recognizer: Arc<dyn TextRecognizer>) -> anyhow::Result<Self> {
        debug!("Starting OCR service with configuration: {:#?}", config);

        let store = FileStore::open(&config.storage.dir).await?;
        let llm = LlmClient::new(&config.llm)?;
        if !llm.has_api_key() {
            warn!("No model API key configured (set OPENAI_API_KEY); extraction requests will fail");
        }
        let extractor = Extractor::new(recognizer, PdfRasterizer::new(&config.ocr), llm);

        let state = AppState::builder()
            .config(config.clone())
            .store(Arc::new(store))
            .extractor(Arc::new(extractor))
            .build();

        let router = build_router(&state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "OCR service listening on http://{}, available at http://localhost:{}",
            bind_addr,
            listener.local_addr()?.port()
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{StaticRecognizer, completion_body, create_test_app};
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};
    use serde_json::json;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers::method};

    #[tokio::test]
    async fn test_openapi_and_docs_are_served() {
        let llm = MockServer::start().await;
        let storage = tempfile::tempdir().unwrap();
        let app = create_test_app(storage.path(), &llm, StaticRecognizer::new("")).await;

        let response = app.get("/api-docs/openapi.json").await;
        response.assert_status_ok();
        let doc: serde_json::Value = response.json();
        assert!(doc["paths"]["/ocr"]["post"].is_object());

        app.get("/docs").await.assert_status_ok();
        app.get("/internal/metrics").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_uploads_survive_restart() {
        let llm = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(r#"{"total": "10"}"#)))
            .mount(&llm)
            .await;
        let storage = tempfile::tempdir().unwrap();

        let file_id = {
            let app = create_test_app(storage.path(), &llm, StaticRecognizer::new("Total 10")).await;
            let file_part = Part::bytes(b"png".as_slice()).file_name("receipt.png");
            let response = app.post("/file-upload").multipart(MultipartForm::new().add_part("file", file_part)).await;
            response.assert_status_ok();
            response.json::<serde_json::Value>()["file_id"].as_str().unwrap().to_string()
        };

        let restarted = create_test_app(storage.path(), &llm, StaticRecognizer::new("Total 10")).await;
        let response = restarted
            .post("/ocr")
            .json(&json!({"file_id": file_id, "ocr": "easyocr", "fields": {"total": "integer"}}))
            .await;

        response.assert_status_ok();
        assert_eq!(response.json::<serde_json::Value>()["result"], json!({"total": 10}));
    }

    #[test]
    fn test_cors_layer_from_config() {
        let mut config = Config::default();
        assert!(create_cors_layer(&config).is_ok());

        config.cors.allowed_origins = vec!["https://app.example.com".to_string()];
        assert!(create_cors_layer(&config).is_ok());

        config.cors.allowed_origins = vec!["bad\norigin".to_string()];
        assert!(create_cors_layer(&config).is_err());
    }
}
