//! Named template lookup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use super::{Result, TemplateError, TemplateFormat};

/// A template read from the content root.
#[derive(Debug, Clone)]
pub struct LoadedTemplate {
    /// The name that was actually loaded, which is the fallback when the
    /// requested template does not exist.
    pub name: String,
    pub bytes: Arc<[u8]>,
    pub format: TemplateFormat,
}

/// Loads binary templates by file name from a directory, caching the bytes.
///
/// Cached bytes are shared read-only; renders always unpack a private copy.
#[derive(Clone)]
pub struct TemplateStore {
    root: PathBuf,
    cache: Cache<String, Arc<[u8]>>,
}

impl TemplateStore {
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        let cache = Cache::builder().time_to_live(ttl).max_capacity(64).build();
        Self {
            root: root.into(),
            cache,
        }
    }

    /// Load `name`, or `fallback` when `name` does not exist.
    pub async fn load(&self, name: &str, fallback: Option<&str>) -> Result<LoadedTemplate> {
        match self.load_one(name).await {
            Err(TemplateError::NotFound(_)) if fallback.is_some() => {
                let fallback = fallback.unwrap_or_default();
                log::debug!("Template {} not found, using fallback {}", name, fallback);
                self.load_one(fallback).await.map_err(|e| match e {
                    TemplateError::NotFound(_) => {
                        TemplateError::NotFound(format!("{name} (fallback {fallback})"))
                    }
                    other => other,
                })
            }
            other => other,
        }
    }

    async fn load_one(&self, name: &str) -> Result<LoadedTemplate> {
        validate_name(name)?;
        let format = TemplateFormat::from_name(name)?;

        if let Some(bytes) = self.cache.get(name).await {
            return Ok(LoadedTemplate {
                name: name.to_string(),
                bytes,
                format,
            });
        }

        let path = self.root.join(name);
        let bytes: Arc<[u8]> = match tokio::fs::read(&path).await {
            Ok(bytes) => Arc::from(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TemplateError::NotFound(name.to_string()));
            }
            Err(source) => {
                log::error!("Failed to read template {}: {}", path.display(), source);
                return Err(TemplateError::Io {
                    name: name.to_string(),
                    source,
                });
            }
        };

        self.cache.insert(name.to_string(), bytes.clone()).await;
        log::debug!("Loaded template {} ({} bytes)", name, bytes.len());

        Ok(LoadedTemplate {
            name: name.to_string(),
            bytes,
            format,
        })
    }

    /// Drop cached bytes so the next load reads the file again.
    pub async fn invalidate(&self, name: &str) {
        self.cache.invalidate(name).await;
    }
}

/// Template names are plain file names under the root.
fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with('.');

    if invalid {
        return Err(TemplateError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with(files: &[(&str, &[u8])]) -> (TempDir, TemplateStore) {
        let dir = TempDir::new().unwrap();
        for (name, bytes) in files {
            std::fs::write(dir.path().join(name), bytes).unwrap();
        }
        let store = TemplateStore::new(dir.path(), Duration::from_secs(60));
        (dir, store)
    }

    #[tokio::test]
    async fn test_load_existing_template() {
        let (_dir, store) = store_with(&[("contract_ABS.docx", b"abs")]);
        let loaded = store.load("contract_ABS.docx", Some("contract.docx")).await.unwrap();

        assert_eq!(loaded.name, "contract_ABS.docx");
        assert_eq!(&loaded.bytes[..], b"abs");
        assert_eq!(loaded.format, TemplateFormat::Docx);
    }

    #[tokio::test]
    async fn test_fallback_is_used_when_missing() {
        let (_dir, store) = store_with(&[("contract.docx", b"generic")]);
        let loaded = store.load("contract_XYZ.docx", Some("contract.docx")).await.unwrap();

        assert_eq!(loaded.name, "contract.docx");
        assert_eq!(&loaded.bytes[..], b"generic");
    }

    #[tokio::test]
    async fn test_missing_without_fallback() {
        let (_dir, store) = store_with(&[]);
        assert!(matches!(
            store.load("approval_letter.docx", None).await,
            Err(TemplateError::NotFound(_))
        ));
        assert!(matches!(
            store.load("a.docx", Some("b.docx")).await,
            Err(TemplateError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let (_dir, store) = store_with(&[]);
        for name in ["../secret.docx", "sub/dir.docx", ".hidden.docx", ""] {
            assert!(matches!(
                store.load(name, None).await,
                Err(TemplateError::InvalidName(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_cached_bytes_survive_file_changes_until_invalidated() {
        let (dir, store) = store_with(&[("summary.xlsx", b"v1")]);
        store.load("summary.xlsx", None).await.unwrap();

        std::fs::write(dir.path().join("summary.xlsx"), b"v2").unwrap();
        let cached = store.load("summary.xlsx", None).await.unwrap();
        assert_eq!(&cached.bytes[..], b"v1");

        store.invalidate("summary.xlsx").await;
        let fresh = store.load("summary.xlsx", None).await.unwrap();
        assert_eq!(&fresh.bytes[..], b"v2");
        assert_eq!(fresh.format, TemplateFormat::Xlsx);
    }
}
