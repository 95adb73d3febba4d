//! Driver verification documents stored on local disk.

use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use super::error::{ServiceError, ServiceResult};
use crate::db::{User, UserRole};

const MAX_FILENAME_LEN: usize = 128;

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub file: String,
}

/// Reduce a client-supplied name to a safe single path component
pub fn sanitize_filename(name: &str) -> String {
    // Browsers on Windows may send the full path
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        return "document".to_string();
    }
    cleaned.chars().take(MAX_FILENAME_LEN).collect()
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    dir: PathBuf,
}

impl DocumentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write `contents` as `<user_id>_<sanitized name>`, replacing any
    /// earlier upload with the same name.
    pub async fn store(
        &self,
        user: &User,
        original_name: &str,
        contents: &[u8],
    ) -> ServiceResult<UploadResponse> {
        if user.role_enum() != UserRole::Driver {
            return Err(ServiceError::forbidden("Only drivers can upload documents"));
        }
        if contents.is_empty() {
            return Err(ServiceError::validation("doc", "Uploaded document is empty"));
        }

        let file = format!("{}_{}", user.id, sanitize_filename(original_name));
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ServiceError::Internal(format!("Failed to create upload directory: {}", e)))?;
        tokio::fs::write(self.dir.join(&file), contents)
            .await
            .map_err(|e| ServiceError::Internal(format!("Failed to store document: {}", e)))?;

        info!(user_id = %user.id, file = %file, bytes = contents.len(), "Driver document stored");
        Ok(UploadResponse {
            message: "Uploaded".to_string(),
            file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;
    use crate::services::accounts::create_test_user;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("licence.pdf"), "licence.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\kofi\\id card.png"), "id_card.png");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename(""), "document");
        assert_eq!(sanitize_filename("dir/"), "document");
        assert_eq!(sanitize_filename(&"a".repeat(300)).len(), MAX_FILENAME_LEN);
    }

    #[tokio::test]
    async fn test_driver_document_is_written() {
        let db = init_memory().await;
        let driver = create_test_user(&db, "driver@example.com", UserRole::Driver).await;
        let tmp = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(tmp.path().join("uploads"));

        let response = store.store(&driver, "licence.pdf", b"%PDF-1.4").await.unwrap();
        assert_eq!(response.file, format!("{}_licence.pdf", driver.id));

        let written = std::fs::read(tmp.path().join("uploads").join(&response.file)).unwrap();
        assert_eq!(written, b"%PDF-1.4");
    }

    #[tokio::test]
    async fn test_riders_cannot_upload() {
        let db = init_memory().await;
        let rider = create_test_user(&db, "rider@example.com", UserRole::Rider).await;
        let tmp = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(tmp.path());

        let err = store.store(&rider, "licence.pdf", b"data").await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}
