//! Stored file records in Postgres.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{FileStore, StoreError};
use crate::models::{NewStoredFile, StoredFile};

const COLUMNS: &str = "id, owner_id, project_id, original_file_name, storage_path, extension, category, created_at, last_downloaded_at";

#[derive(Debug, Clone)]
pub struct PgFileStore {
    pool: PgPool,
}

impl PgFileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileStore for PgFileStore {
    async fn insert(&self, file: NewStoredFile) -> Result<StoredFile, StoreError> {
        let query = format!(
            r#"
            INSERT INTO stored_files (owner_id, project_id, original_file_name, storage_path, extension, category)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {COLUMNS}
            "#
        );
        let stored = sqlx::query_as::<_, StoredFile>(&query)
            .bind(file.owner_id)
            .bind(file.project_id)
            .bind(&file.original_file_name)
            .bind(&file.storage_path)
            .bind(&file.extension)
            .bind(file.category.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(stored)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<StoredFile>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM stored_files WHERE id = $1");
        let file = sqlx::query_as::<_, StoredFile>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(file)
    }

    async fn touch_download(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE stored_files SET last_downloaded_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
