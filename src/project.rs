//! Owning-project resolution for generated files.

use std::sync::Arc;

use thiserror::Error;

use crate::db::{ProjectStore, StoreError};
use crate::models::Project;
use crate::shaping::shape;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("project {0} not found")]
    NotFound(i64),
    #[error("project {0} is not owned by the caller")]
    Forbidden(i64),
    #[error("a project name is required")]
    MissingName,
    #[error("project store failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct ProjectResolver {
    store: Arc<dyn ProjectStore>,
}

impl ProjectResolver {
    pub fn new(store: Arc<dyn ProjectStore>) -> Self {
        Self { store }
    }

    /// Check that `project_id` exists and belongs to `owner_id`.
    pub async fn verify_explicit(
        &self,
        owner_id: i64,
        project_id: i64,
    ) -> Result<Project, ProjectError> {
        let project = self
            .store
            .find_by_id(project_id)
            .await?
            .ok_or(ProjectError::NotFound(project_id))?;

        if project.owner_id != owner_id {
            log::warn!(
                "User {} referenced project {} owned by {}",
                owner_id,
                project_id,
                project.owner_id
            );
            return Err(ProjectError::Forbidden(project_id));
        }
        Ok(project)
    }

    /// The explicit project when one is given, otherwise the caller's project
    /// named `project_name`, created on first use.
    pub async fn resolve(
        &self,
        owner_id: i64,
        project_name: &str,
        explicit_id: Option<i64>,
        origin: &str,
    ) -> Result<Project, ProjectError> {
        if let Some(id) = explicit_id {
            return self.verify_explicit(owner_id, id).await;
        }

        let name = shape(project_name);
        if name.is_empty() {
            return Err(ProjectError::MissingName);
        }

        let project = self
            .store
            .find_or_create(owner_id, &name, &auto_description(origin))
            .await?;
        log::debug!("Resolved project {} ({}) for user {}", project.id, project.name, owner_id);
        Ok(project)
    }
}

pub fn auto_description(origin: &str) -> String {
    format!("Created automatically while generating {origin}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryProjectStore;

    fn resolver() -> (Arc<MemoryProjectStore>, ProjectResolver) {
        let store = Arc::new(MemoryProjectStore::new());
        (store.clone(), ProjectResolver::new(store))
    }

    #[tokio::test]
    async fn test_creates_then_reuses_by_name() {
        let (store, resolver) = resolver();

        let created = resolver.resolve(1, "Bridge", None, "a contract").await.unwrap();
        assert_eq!(
            created.description.as_deref(),
            Some("Created automatically while generating a contract")
        );

        let reused = resolver
            .resolve(1, "  Bridge ", None, "an approval letter")
            .await
            .unwrap();
        assert_eq!(created.id, reused.id);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_same_name_for_different_owners() {
        let (_, resolver) = resolver();
        let a = resolver.resolve(1, "Bridge", None, "x").await.unwrap();
        let b = resolver.resolve(2, "Bridge", None, "x").await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_explicit_id_must_exist_and_be_owned() {
        let (_, resolver) = resolver();
        let theirs = resolver.resolve(2, "Private", None, "x").await.unwrap();

        assert!(matches!(
            resolver.resolve(1, "ignored", Some(theirs.id), "x").await,
            Err(ProjectError::Forbidden(_))
        ));
        assert!(matches!(
            resolver.resolve(1, "ignored", Some(999), "x").await,
            Err(ProjectError::NotFound(999))
        ));

        let mine = resolver.resolve(2, "", Some(theirs.id), "x").await.unwrap();
        assert_eq!(mine.id, theirs.id);
    }

    #[tokio::test]
    async fn test_blank_name_without_id() {
        let (_, resolver) = resolver();
        assert!(matches!(
            resolver.resolve(1, "   ", None, "x").await,
            Err(ProjectError::MissingName)
        ));
    }
}
