//! Extraction strategies.
//!
//! An [`Extractor`] takes a stored file and a field specification and produces the raw text plus
//! a value for each requested field, using one of two strategies selected by [`OcrMode`]:
//!
//! - [`OcrMode::LocalOcr`]: recognize text locally, then have the text model parse it.
//! - [`OcrMode::LlmOcr`]: send the image to the vision model, which does both.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::fields::NormalizedField;
use crate::llm::{InlineImage, LlmClient};
use crate::ocr::TextRecognizer;
use crate::ocr::pdf::{Pages, PdfRasterizer};
use crate::storage::StoredFile;
use crate::types::abbrev_uuid;

/// Failures from the OCR engine, the PDF rasterizer or the model API.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with status {code}: {detail}")]
    ToolFailed { program: String, code: i32, detail: String },

    #[error("recognized text is not valid UTF-8")]
    InvalidText,

    #[error("PDF has no renderable pages")]
    EmptyPdf,

    #[error("model API key is not configured")]
    MissingApiKey,

    #[error("model API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model API returned {status}: {body}")]
    ModelApi { status: u16, body: String },

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("failed to parse extraction results: {0}")]
    ModelOutput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Extraction strategy, named as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum OcrMode {
    /// Local OCR engine followed by a text model
    #[serde(rename = "easyocr")]
    LocalOcr,
    /// Single vision model call
    #[serde(rename = "llm_ocr")]
    LlmOcr,
}

impl OcrMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrMode::LocalOcr => "easyocr",
            OcrMode::LlmOcr => "llm_ocr",
        }
    }
}

/// Raw text plus the requested fields, in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub raw_text: String,
    pub fields: IndexMap<String, Value>,
}

pub struct Extractor {
    recognizer: Arc<dyn TextRecognizer>,
    rasterizer: PdfRasterizer,
    llm: LlmClient,
}

impl Extractor {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, rasterizer: PdfRasterizer, llm: LlmClient) -> Self {
        Self { recognizer, rasterizer, llm }
    }

    #[instrument(skip_all, fields(file_id = %abbrev_uuid(&file.id), mode = mode.as_str()), err)]
    pub async fn process(&self, mode: OcrMode, file: &StoredFile, fields: &[NormalizedField]) -> Result<Extraction, ExtractionError> {
        let extraction = match mode {
            OcrMode::LocalOcr => {
                let raw_text = self.recognize(file).await?;
                info!(chars = raw_text.chars().count(), "Text extracted");
                let fields = self.llm.parse_text(&raw_text, fields).await?;
                Extraction { raw_text, fields }
            }
            OcrMode::LlmOcr => {
                let image = self.inline_image(file).await?;
                let reading = self.llm.read_image(&image, fields).await?;
                info!(chars = reading.raw_text.chars().count(), "Vision model processed image");
                Extraction {
                    raw_text: reading.raw_text,
                    fields: reading.fields,
                }
            }
        };

        info!(fields = ?extraction.fields.keys().collect::<Vec<_>>(), "Fields parsed");
        Ok(extraction)
    }

    /// Run the local recognizer over every page of the file.
    async fn recognize(&self, file: &StoredFile) -> Result<String, ExtractionError> {
        if !file.is_pdf() {
            return self.recognizer.recognize(&file.path).await;
        }

        let pages = self.rasterizer.render(&file.path, Pages::All).await?;
        let mut texts = Vec::with_capacity(pages.len());
        for (index, page) in pages.paths().iter().enumerate() {
            info!(page = index + 1, total = pages.len(), "Recognizing page");
            let text = self.recognizer.recognize(page).await?;
            if !text.is_empty() {
                texts.push(text);
            }
        }
        Ok(texts.join(" "))
    }

    /// Load the file as an inline image; PDFs contribute their first page as PNG.
    async fn inline_image(&self, file: &StoredFile) -> Result<InlineImage, ExtractionError> {
        if file.is_pdf() {
            let pages = self.rasterizer.render(&file.path, Pages::First).await?;
            let first = pages.first().ok_or(ExtractionError::EmptyPdf)?;
            return Ok(InlineImage {
                bytes: tokio::fs::read(first).await?,
                mime_type: "image/png".to_string(),
            });
        }

        let mime_type = mime_guess::from_path(&file.path)
            .first()
            .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| "image/jpeg".to_string());

        Ok(InlineImage {
            bytes: tokio::fs::read(&file.path).await?,
            mime_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LlmConfig, OcrConfig};
    use crate::fields::FieldSpec;
    use crate::storage::FileStore;
    use crate::test_utils::{StaticRecognizer, completion_body};
    use serde_json::json;
    use url::Url;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string_contains, method, path},
    };

    fn extractor(server: &MockServer, recognizer: StaticRecognizer) -> Extractor {
        extractor_with(server, Arc::new(recognizer), &OcrConfig::default())
    }

    fn extractor_with(server: &MockServer, recognizer: Arc<dyn TextRecognizer>, ocr: &OcrConfig) -> Extractor {
        let llm = LlmClient::new(&LlmConfig {
            api_key: Some("sk-test".to_string()),
            base_url: Url::parse(&format!("{}/v1", server.uri())).unwrap(),
            ..Default::default()
        })
        .unwrap();
        Extractor::new(recognizer, PdfRasterizer::new(ocr), llm)
    }

    /// Returns each page image's contents as its text.
    struct EchoRecognizer;

    #[async_trait::async_trait]
    impl TextRecognizer for EchoRecognizer {
        async fn recognize(&self, image: &std::path::Path) -> Result<String, ExtractionError> {
            Ok(tokio::fs::read_to_string(image).await?)
        }
    }

    /// Install a stand-in `pdftoppm` that writes `pages` PNGs named like poppler's, each containing
    /// `P<n>`. With `-f 1 -l 1` it stops after the first page.
    #[cfg(unix)]
    fn fake_pdftoppm(dir: &std::path::Path, pages: usize) -> OcrConfig {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("pdftoppm");
        let body = format!(
            r#"#!/bin/sh
for arg; do prefix="$arg"; done
count={pages}
case " $* " in *" -f 1 -l 1 "*) if [ "$count" -gt 1 ]; then count=1; fi ;; esac
i=1
while [ "$i" -le "$count" ]; do
  printf 'P%s' "$i" > "$prefix-$i.png"
  i=$((i + 1))
done
"#
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        OcrConfig {
            pdftoppm_path: script.to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn test_mode_wire_names() {
        assert_eq!(serde_json::to_value(OcrMode::LocalOcr).unwrap(), json!("easyocr"));
        assert_eq!(serde_json::from_value::<OcrMode>(json!("llm_ocr")).unwrap(), OcrMode::LlmOcr);
        assert!(serde_json::from_value::<OcrMode>(json!("tesseract")).is_err());
    }

    #[test_log::test(tokio::test)]
    async fn test_local_ocr_feeds_recognized_text_to_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_string_contains("Vergi No 1234567890"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(r#"{"tax_id": "1234567890"}"#)))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let file = store.save("invoice.png", b"png").await.unwrap();
        let fields = FieldSpec::List(vec!["tax_id".to_string(), "total".to_string()]).normalize().unwrap();

        let extraction = extractor(&server, StaticRecognizer::new("Vergi No 1234567890"))
            .process(OcrMode::LocalOcr, &file, &fields)
            .await
            .unwrap();

        assert_eq!(extraction.raw_text, "Vergi No 1234567890");
        assert_eq!(extraction.fields["tax_id"], json!("1234567890"));
        assert_eq!(extraction.fields["total"], Value::Null);
    }

    #[test_log::test(tokio::test)]
    async fn test_vision_guesses_mime_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("data:image/png;base64,"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(r#"{"raw_text": "hi", "fields": {}}"#)))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let file = store.save("scan.PNG", b"png").await.unwrap();
        let fields = FieldSpec::List(vec!["name".to_string()]).normalize().unwrap();

        let extraction = extractor(&server, StaticRecognizer::new("unused"))
            .process(OcrMode::LlmOcr, &file, &fields)
            .await
            .unwrap();

        assert_eq!(extraction.raw_text, "hi");
        assert_eq!(extraction.fields["name"], Value::Null);
    }

    #[tokio::test]
    async fn test_unknown_extension_defaults_to_jpeg() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let file = store.save("photo.unknownext", b"img").await.unwrap();

        let image = extractor(&server, StaticRecognizer::new("")).inline_image(&file).await.unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.bytes, b"img");
    }

    #[tokio::test]
    async fn test_recognizer_failure_propagates() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let file = store.save("invoice.png", b"png").await.unwrap();
        let fields = FieldSpec::List(vec!["a".to_string()]).normalize().unwrap();

        let result = extractor(&server, StaticRecognizer::failing())
            .process(OcrMode::LocalOcr, &file, &fields)
            .await;

        assert!(matches!(result, Err(ExtractionError::ToolFailed { .. })));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test_log::test(tokio::test)]
    async fn test_local_ocr_reads_every_pdf_page_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("P1 P2 P3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(r#"{"pages": "3"}"#)))
            .expect(1)
            .mount(&server)
            .await;

        let tools = tempfile::tempdir().unwrap();
        let ocr = fake_pdftoppm(tools.path(), 3);
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let file = store.save("statement.pdf", b"%PDF-1.4").await.unwrap();
        let fields = serde_json::from_str::<FieldSpec>(r#"{"pages": "integer"}"#).unwrap().normalize().unwrap();

        let extraction = extractor_with(&server, Arc::new(EchoRecognizer), &ocr)
            .process(OcrMode::LocalOcr, &file, &fields)
            .await
            .unwrap();

        assert_eq!(extraction.raw_text, "P1 P2 P3");
        assert_eq!(extraction.fields["pages"], json!(3));
    }

    #[cfg(unix)]
    #[test_log::test(tokio::test)]
    async fn test_vision_sends_first_pdf_page_as_png() {
        let server = MockServer::start().await;
        // base64("P1")
        Mock::given(method("POST"))
            .and(body_string_contains("data:image/png;base64,UDE="))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
                r#"{"raw_text": "page one", "fields": {"title": "Statement"}}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let tools = tempfile::tempdir().unwrap();
        let ocr = fake_pdftoppm(tools.path(), 3);
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let file = store.save("statement.pdf", b"%PDF-1.4").await.unwrap();
        let fields = FieldSpec::List(vec!["title".to_string()]).normalize().unwrap();

        let extraction = extractor_with(&server, Arc::new(EchoRecognizer), &ocr)
            .process(OcrMode::LlmOcr, &file, &fields)
            .await
            .unwrap();

        assert_eq!(extraction.raw_text, "page one");
        assert_eq!(extraction.fields["title"], json!("Statement"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pdf_without_pages_fails_in_both_modes() {
        let server = MockServer::start().await;
        let tools = tempfile::tempdir().unwrap();
        let ocr = fake_pdftoppm(tools.path(), 0);
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let file = store.save("blank.pdf", b"%PDF-1.4").await.unwrap();
        let fields = FieldSpec::List(vec!["a".to_string()]).normalize().unwrap();
        let extractor = extractor_with(&server, Arc::new(EchoRecognizer), &ocr);

        for mode in [OcrMode::LocalOcr, OcrMode::LlmOcr] {
            let result = extractor.process(mode, &file, &fields).await;
            assert!(matches!(result, Err(ExtractionError::EmptyPdf)), "{mode:?}: {result:?}");
        }
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
