use crate::storage::StoredFile;
use crate::types::FileId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Multipart body for `POST /file-upload`, for documentation only
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct FileUploadForm {
    /// Image (.jpg .jpeg .png .gif .bmp .tiff .webp) or PDF, at most 10MB by default
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

/// Identifier of a stored upload, to be passed to `POST /ocr`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileUploadResponse {
    #[schema(value_type = String, format = "uuid")]
    pub file_id: FileId,
}

impl From<&StoredFile> for FileUploadResponse {
    fn from(file: &StoredFile) -> Self {
        Self { file_id: file.id }
    }
}
