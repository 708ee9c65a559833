use crate::AppState;
use crate::api::models::ocr::{OcrRequest, OcrResponse};
use crate::errors::{Error, Result};
use axum::{Json, extract::State};
use uuid::Uuid;

#[utoipa::path(
    post,
    path = "/ocr",
    tag = "ocr",
    summary = "Extract fields",
    description = "Read a previously uploaded file and extract the requested fields.

With `ocr = \"easyocr\"` the text is recognized locally and then parsed by a language model. With `ocr = \"llm_ocr\"` the image (or the first page of a PDF) is sent to a vision model that does both.",
    request_body = OcrRequest,
    responses(
        (status = 200, description = "Fields extracted", body = OcrResponse),
        (status = 400, description = "Invalid field specification"),
        (status = 404, description = "Unknown file_id, or the file is no longer on disk"),
        (status = 422, description = "Malformed request body or unsupported `ocr` value"),
        (status = 500, description = "OCR engine or model API failure")
    )
)]
pub async fn run_ocr(State(state): State<AppState>, Json(request): Json<OcrRequest>) -> Result<Json<OcrResponse>> {
    // Anything that is not a UUID can never have been issued by the upload endpoint
    let file_id = Uuid::parse_str(request.file_id.trim()).map_err(|_| Error::NotFound {
        resource: "File".to_string(),
        id: request.file_id.clone(),
    })?;

    let file = state.store.resolve(&file_id).await?;
    let fields = request.fields.normalize()?;

    tracing::info!(file_id = %file_id, ocr = request.ocr.as_str(), fields = fields.len(), "Running extraction");
    let extraction = state.extractor.process(request.ocr, &file, &fields).await?;

    Ok(Json(OcrResponse {
        file_id: request.file_id,
        ocr: request.ocr,
        result: extraction.fields,
        raw_ocr: extraction.raw_text,
    }))
}
