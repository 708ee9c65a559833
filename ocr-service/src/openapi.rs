//! OpenAPI document for the service, served at `/api-docs/openapi.json` and rendered at `/docs`.

use utoipa::OpenApi;

use crate::api;
use crate::extraction::OcrMode;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "OCR Service",
        description = "Upload images or PDFs and extract structured fields with local OCR or a vision language model."
    ),
    paths(
        api::handlers::health::health,
        api::handlers::files::upload_file,
        api::handlers::ocr::run_ocr,
    ),
    components(schemas(
        api::models::health::HealthResponse,
        api::models::files::FileUploadForm,
        api::models::files::FileUploadResponse,
        api::models::ocr::OcrRequest,
        api::models::ocr::OcrResponse,
        OcrMode,
    )),
    tags(
        (name = "health", description = "Liveness"),
        (name = "files", description = "Document upload"),
        (name = "ocr", description = "Field extraction"),
    )
)]
pub struct ApiDoc;
