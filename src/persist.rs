//! Writing rendered documents and uploads to storage.

use std::sync::Arc;

use uuid::Uuid;

use crate::storage::{ObjectStorage, StorageError};

const MAX_NAME_CHARS: usize = 80;
const FALLBACK_NAME: &str = "document";
const DOCUMENTS_DIR: &str = "documents";

#[derive(Clone)]
pub struct DocumentPersistor {
    storage: Arc<dyn ObjectStorage>,
}

impl DocumentPersistor {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Save a generated document and return its storage-relative path.
    pub async fn save(
        &self,
        bytes: &[u8],
        desired_name: &str,
        extension: &str,
    ) -> Result<String, StorageError> {
        let path = storage_path(desired_name, extension);
        self.storage.upload_file(&path, bytes).await?;
        log::info!("Saved {} bytes to {}", bytes.len(), path);
        Ok(path)
    }

    /// Remove a saved document whose record could not be written.
    pub async fn discard(&self, path: &str) {
        if let Err(e) = self.storage.delete_file(path).await {
            log::warn!("Failed to remove orphaned {}: {}", path, e);
        }
    }
}

/// `documents/<uuid>_<sanitized name>.<ext>`
pub fn storage_path(desired_name: &str, extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    let name = sanitize_name(desired_name);
    let unique = Uuid::new_v4().simple();

    if extension.is_empty() {
        format!("{}/{}_{}", DOCUMENTS_DIR, unique, name)
    } else {
        format!("{}/{}_{}.{}", DOCUMENTS_DIR, unique, name, extension)
    }
}

/// Strip path-hostile characters, turn whitespace runs into `_` and cap the
/// length. Never returns an empty string.
pub fn sanitize_name(name: &str) -> String {
    let cleaned = sanitize_filename::sanitize(name);

    let mut result = String::new();
    let mut last_underscore = false;
    for ch in cleaned.trim().chars() {
        if ch.is_whitespace() {
            if !last_underscore && !result.is_empty() {
                result.push('_');
                last_underscore = true;
            }
        } else if ch == '.' && result.is_empty() {
            // no hidden files
        } else {
            result.push(ch);
            last_underscore = false;
        }
    }

    let capped: String = result.chars().take(MAX_NAME_CHARS).collect();
    let capped = capped.trim_end_matches(['_', '.']).to_string();

    if capped.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        capped
    }
}
