//! Database module - store traits, their Postgres and in-memory
//! implementations, and the shared `AppState`.
//!
//! - `counter` - per-type contract counters
//! - `project` - owning projects
//! - `file` - stored file records
//! - `memory` - in-memory stores for tests and database-less runs

pub mod counter;
pub mod file;
pub mod memory;
pub mod project;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::auth::capability::CapabilityTokenService;
use crate::config::AppConfig;
use crate::generation::GenerationOrchestrator;
use crate::models::{NewStoredFile, Project, StoredFile};
use crate::numbering::ContractNumberingService;
use crate::persist::DocumentPersistor;
use crate::project::ProjectResolver;
use crate::storage::{LocalStorage, ObjectStorage};
use crate::template::TemplateStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter for `contract_type` (creating it at 1) and
    /// return the new value, as one atomic step.
    async fn increment(&self, contract_type: &str) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Project>, StoreError>;

    /// Return the caller's project named `name`, creating it atomically.
    async fn find_or_create(
        &self,
        owner_id: i64,
        name: &str,
        description: &str,
    ) -> Result<Project, StoreError>;
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn insert(&self, file: NewStoredFile) -> Result<StoredFile, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<StoredFile>, StoreError>;

    async fn touch_download(&self, id: i64) -> Result<(), StoreError>;
}

/// The three stores the service needs, behind their traits.
#[derive(Clone)]
pub struct Stores {
    pub counters: Arc<dyn CounterStore>,
    pub projects: Arc<dyn ProjectStore>,
    pub files: Arc<dyn FileStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            counters: Arc::new(counter::PgCounterStore::new(pool.clone())),
            projects: Arc::new(project::PgProjectStore::new(pool.clone())),
            files: Arc::new(file::PgFileStore::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            counters: Arc::new(memory::MemoryCounterStore::new()),
            projects: Arc::new(memory::MemoryProjectStore::new()),
            files: Arc::new(memory::MemoryFileStore::new()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: GenerationOrchestrator,
    pub tokens: CapabilityTokenService,
    pub files: Arc<dyn FileStore>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl AppState {
    /// Connect to Postgres, run migrations and wire up the services.
    pub async fn new(config: AppConfig) -> Result<Self, StoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(100)
            .min_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(900))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        log::info!("Database migrations applied");

        let storage: Arc<dyn ObjectStorage> = Arc::new(LocalStorage::new(&config.storage_root));
        Ok(Self::with_parts(config, Stores::postgres(pool), storage))
    }

    /// Build state over the given stores with local file storage.
    pub fn with_stores(config: AppConfig, stores: Stores) -> Self {
        let storage: Arc<dyn ObjectStorage> = Arc::new(LocalStorage::new(&config.storage_root));
        Self::with_parts(config, stores, storage)
    }

    pub fn with_parts(config: AppConfig, stores: Stores, storage: Arc<dyn ObjectStorage>) -> Self {
        let templates = TemplateStore::new(&config.template_root, config.template_cache_ttl);
        let orchestrator = GenerationOrchestrator::new(
            templates,
            ContractNumberingService::new(stores.counters.clone()),
            DocumentPersistor::new(storage.clone()),
            ProjectResolver::new(stores.projects.clone()),
            stores.files.clone(),
        );
        let tokens = CapabilityTokenService::new(&config.capability_secret, &config.download_root);

        Self {
            config,
            orchestrator,
            tokens,
            files: stores.files,
            storage,
        }
    }
}
