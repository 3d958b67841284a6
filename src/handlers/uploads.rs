//! Upload endpoint.

use axum::extract::rejection::ExtensionRejection;
use axum::http::StatusCode;
use axum::{Extension, Json};
use tracing::{info, instrument};

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::middleware::UploadedParts;
use crate::models::{UploadResponse, UploadedPartInfo};

/// Accept a `multipart/form-data` body and describe its parts.
///
/// The multipart stage has already parsed and size-checked every part; a
/// missing extension means the request carried no multipart body at all.
#[instrument(skip_all)]
pub async fn create_upload(
    parts: Result<Extension<UploadedParts>, ExtensionRejection>,
) -> AppResult<(StatusCode, Json<UploadResponse>)> {
    let Ok(Extension(parts)) = parts else {
        return Err(AppError::BadRequest(
            "Expected a multipart/form-data body".to_string(),
        ));
    };

    let parts: Vec<UploadedPartInfo> = parts
        .iter()
        .map(|part| UploadedPartInfo {
            field_name: part.field_name.clone(),
            file_name: part.file_name.clone(),
            content_type: part.content_type.clone(),
            size: part.data.len(),
        })
        .collect();
    let total_bytes: usize = parts.iter().map(|part| part.size).sum();

    info!(count = parts.len(), total_bytes, "Upload received");
    metrics::record_upload(parts.len(), total_bytes);

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            count: parts.len(),
            total_bytes,
            parts,
        }),
    ))
}
