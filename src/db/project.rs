//! Projects in Postgres.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{ProjectStore, StoreError};
use crate::models::Project;

#[derive(Debug, Clone)]
pub struct PgProjectStore {
    pool: PgPool,
}

impl PgProjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectStore for PgProjectStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Project>, StoreError> {
        let project = sqlx::query_as::<_, Project>(
            "SELECT id, owner_id, name, description, created_at FROM projects WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(project)
    }

    async fn find_or_create(
        &self,
        owner_id: i64,
        name: &str,
        description: &str,
    ) -> Result<Project, StoreError> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let project = sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects (owner_id, name, description)
            VALUES ($1, $2, $3)
            ON CONFLICT (owner_id, name)
            DO UPDATE SET name = EXCLUDED.name
            RETURNING id, owner_id, name, description, created_at
            "#,
        )
        .bind(owner_id)
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;
        Ok(project)
    }
}
