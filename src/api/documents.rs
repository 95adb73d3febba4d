use axum::{
    extract::{Multipart, State},
    Json,
};
use std::sync::Arc;

use super::error::ApiError;
use crate::db::{User, UserRole};
use crate::services::UploadResponse;
use crate::AppState;

/// Multipart field carrying the document
const DOC_FIELD: &str = "doc";

/// POST /drivers/upload-document
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    user: User,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    // Refuse before reading the body
    if user.role_enum() != UserRole::Driver {
        return Err(ApiError::forbidden("Only drivers can upload documents"));
    }

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(DOC_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let contents = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;

        let stored = state.documents.store(&user, &file_name, &contents).await?;
        return Ok(Json(stored));
    }

    Err(ApiError::validation_field(DOC_FIELD, "A document file is required"))
}
