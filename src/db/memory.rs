//! In-memory stores for tests and database-less runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{CounterStore, FileStore, ProjectStore, StoreError};
use crate::models::{NewStoredFile, Project, StoredFile};

#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<String, i64>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, contract_type: &str) -> Option<i64> {
        self.counters.lock().get(contract_type).copied()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, contract_type: &str) -> Result<i64, StoreError> {
        let mut counters = self.counters.lock();
        let number = counters.entry(contract_type.to_string()).or_insert(0);
        *number += 1;
        Ok(*number)
    }
}

#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    projects: Mutex<Vec<Project>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.projects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.lock().is_empty()
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Project>, StoreError> {
        Ok(self.projects.lock().iter().find(|p| p.id == id).cloned())
    }

    async fn find_or_create(
        &self,
        owner_id: i64,
        name: &str,
        description: &str,
    ) -> Result<Project, StoreError> {
        let mut projects = self.projects.lock();
        if let Some(existing) = projects
            .iter()
            .find(|p| p.owner_id == owner_id && p.name == name)
        {
            return Ok(existing.clone());
        }

        let project = Project {
            id: projects.len() as i64 + 1,
            owner_id,
            name: name.to_string(),
            description: Some(description.to_string()),
            created_at: Utc::now(),
        };
        projects.push(project.clone());
        Ok(project)
    }
}

#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: Mutex<Vec<StoredFile>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<StoredFile> {
        self.files.lock().clone()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn insert(&self, file: NewStoredFile) -> Result<StoredFile, StoreError> {
        let mut files = self.files.lock();
        let stored = StoredFile {
            id: files.len() as i64 + 1,
            owner_id: file.owner_id,
            project_id: file.project_id,
            original_file_name: file.original_file_name,
            storage_path: file.storage_path,
            extension: file.extension,
            category: file.category,
            created_at: Utc::now(),
            last_downloaded_at: None,
        };
        files.push(stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<StoredFile>, StoreError> {
        Ok(self.files.lock().iter().find(|f| f.id == id).cloned())
    }

    async fn touch_download(&self, id: i64) -> Result<(), StoreError> {
        if let Some(file) = self.files.lock().iter_mut().find(|f| f.id == id) {
            file.last_downloaded_at = Some(Utc::now());
        }
        Ok(())
    }
}
