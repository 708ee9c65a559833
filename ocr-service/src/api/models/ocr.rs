use crate::extraction::OcrMode;
use crate::fields::FieldSpec;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Body of `POST /ocr`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OcrRequest {
    /// Identifier returned by `POST /file-upload`
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub file_id: String,

    /// `easyocr` runs the local OCR engine and then a text model; `llm_ocr` sends the image to a
    /// vision model
    pub ocr: OcrMode,

    /// Fields to extract: a list of names, or a map from name to a type tag (`string`, `integer`,
    /// `float`, `number`, `boolean`, `date`, `list`), a description, or
    /// `{"name", "type", "description"}`
    #[schema(value_type = Object, example = json!({"tax_id": "integer", "company_name": "legal name of the issuer"}))]
    pub fields: FieldSpec,
}

/// Extraction result
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OcrResponse {
    pub file_id: String,
    pub ocr: OcrMode,
    /// One entry per requested field, in request order; `null` where nothing was found
    #[schema(value_type = Object)]
    pub result: IndexMap<String, Value>,
    /// Full text read from the document
    pub raw_ocr: String,
}
