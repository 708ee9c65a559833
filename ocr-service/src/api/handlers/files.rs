use crate::AppState;
use crate::api::models::files::{FileUploadForm, FileUploadResponse};
use crate::errors::{Error, Result};
use crate::storage::{extension_of, sanitize_file_name};
use crate::types::abbrev_uuid;
use axum::{
    Json,
    extract::{Multipart, State},
};
use bytes::BytesMut;

#[utoipa::path(
    post,
    path = "/file-upload",
    tag = "files",
    summary = "Upload file",
    description = "Store an image or PDF for later extraction. The returned `file_id` is passed to `POST /ocr`.",
    request_body(
        content = FileUploadForm,
        content_type = "multipart/form-data",
        description = "Multipart form with a single `file` part"
    ),
    responses(
        (status = 200, description = "File stored", body = FileUploadResponse),
        (status = 400, description = "Unsupported file type, file too large, empty or missing file"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn upload_file(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<FileUploadResponse>> {
    let limits = &state.config.storage;
    let max_file_size = limits.max_file_size;

    let mut upload: Option<(String, BytesMut)> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(|e| Error::BadRequest {
        message: format!("Failed to parse multipart data: {}", e),
    })? {
        let field_name = field.name().unwrap_or("").to_string();
        if field_name != "file" {
            tracing::debug!(field = %field_name, "Ignoring unexpected multipart field");
            continue;
        }

        let filename = field.file_name().and_then(sanitize_file_name).ok_or_else(|| Error::BadRequest {
            message: "Uploaded file must have a filename".to_string(),
        })?;

        // Reject on the name alone, before reading any content
        let extension = extension_of(&filename).unwrap_or_default();
        if !limits.is_allowed(&extension) {
            return Err(Error::BadRequest {
                message: format!(
                    "Unsupported file type: {}. Allowed types: {}",
                    if extension.is_empty() { "(none)" } else { extension.as_str() },
                    limits.allowed_extensions.join(", ")
                ),
            });
        }

        tracing::info!(filename = %filename, "Receiving upload");

        let mut content = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(|e| Error::BadRequest {
            message: format!("Failed to read file chunk: {}", e),
        })? {
            // Fail fast once the ceiling is crossed instead of buffering the rest
            if (content.len() + chunk.len()) as u64 > max_file_size {
                tracing::warn!(
                    filename = %filename,
                    received = content.len() + chunk.len(),
                    max_file_size = max_file_size,
                    "File size limit exceeded, aborting upload"
                );
                return Err(Error::BadRequest {
                    message: format!("File too large. Maximum size is {}", human_size(max_file_size)),
                });
            }
            content.extend_from_slice(&chunk);
        }

        upload = Some((filename, content));
    }

    let (filename, content) = upload.ok_or_else(|| Error::BadRequest {
        message: "No file provided: expected a multipart field named 'file'".to_string(),
    })?;

    if content.is_empty() {
        return Err(Error::BadRequest {
            message: "Uploaded file is empty".to_string(),
        });
    }

    let stored = state.store.save(&filename, &content).await?;

    tracing::info!(
        file_id = %abbrev_uuid(&stored.id),
        filename = %stored.original_name,
        bytes = stored.size_bytes,
        "File uploaded successfully"
    );

    Ok(Json(FileUploadResponse::from(&stored)))
}

/// Render a byte ceiling in the largest unit that keeps it non-zero.
fn human_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    match bytes {
        b if b >= MIB => format!("{}MB", b / MIB),
        b if b >= KIB => format!("{}KB", b / KIB),
        b => format!("{b} bytes"),
    }
}
