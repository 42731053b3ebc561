#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docgen_server::db::memory::{MemoryCounterStore, MemoryFileStore, MemoryProjectStore};
use docgen_server::db::{CounterStore, FileStore, StoreError, Stores};
use docgen_server::models::{NewStoredFile, StoredFile};
use docgen_server::storage::{ObjectStorage, StorageError};
use docgen_server::template::test_utils::{minimal_docx, minimal_xlsx, paragraph, table_row};
use docgen_server::{AppConfig, AppState};
use serde_json::{json, Map, Value};
use tempfile::TempDir;

pub const SECRET: &str = "integration-test-secret";
pub const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

/// In-memory object storage.
#[derive(Default)]
pub struct MockObjectStorage {
    files: tokio::sync::Mutex<HashMap<String, Vec<u8>>>,
    fail_uploads: bool,
}

impl MockObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_uploads: true,
            ..Self::default()
        }
    }

    pub async fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().await.get(path).cloned()
    }

    pub async fn len(&self) -> usize {
        self.files.lock().await.len()
    }
}

#[async_trait]
impl ObjectStorage for MockObjectStorage {
    async fn upload_file(&self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_uploads {
            return Err(StorageError::Io {
                path: path.to_string(),
                source: std::io::Error::other("disk full"),
            });
        }
        self.files.lock().await.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn download_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.get(path)
            .await
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        self.files.lock().await.remove(path);
        Ok(())
    }
}

/// A counter store whose database is down.
pub struct OfflineCounterStore;

#[async_trait]
impl CounterStore for OfflineCounterStore {
    async fn increment(&self, _contract_type: &str) -> Result<i64, StoreError> {
        Err(StoreError::Unavailable("counter database offline".to_string()))
    }
}

pub fn contract_body(heading: &str) -> String {
    [
        paragraph(&format!("{heading} {{document_title}} {{contract_number}}")),
        paragraph("Project: {project_name}"),
        paragraph("Contractor: {contractor_name}"),
        paragraph("Value: {contract_value_formatted}"),
        format!(
            "<w:tbl>{}{}</w:tbl>",
            table_row(&["No", "Activity", "Amount"]),
            table_row(&["{#activities}{no}", "{description}", "{amount_formatted}{/activities}"]),
        ),
        paragraph("Total: {activities_total}"),
        paragraph("{^activities}No activities{/activities}"),
        paragraph("Unknown: [{mystery}]"),
        paragraph("{signature}"),
    ]
    .concat()
}

fn write_templates(dir: &std::path::Path) {
    let write = |name: &str, bytes: Vec<u8>| std::fs::write(dir.join(name), bytes).unwrap();

    write("contract.docx", minimal_docx(&contract_body("GENERIC")).unwrap());
    write("contract_DMR.docx", minimal_docx(&contract_body("DMR")).unwrap());
    write(
        "approval_letter.docx",
        minimal_docx(
            &[
                paragraph("To: {recipient_name}"),
                paragraph("Re: {subject} ({project_name})"),
                paragraph("{body}"),
                paragraph("{signature}"),
            ]
            .concat(),
        )
        .unwrap(),
    );
    write(
        "terms_of_reference.docx",
        minimal_docx(
            &[
                paragraph("Terms of Reference: {project_name}"),
                paragraph("{background}"),
                paragraph("{objectives}"),
            ]
            .concat(),
        )
        .unwrap(),
    );
    write(
        "project_summary.xlsx",
        minimal_xlsx(
            &[
                "Project: {{project_name}}",
                "Budget: {{total_budget_formatted}}",
                "{{unknown_key}}",
            ],
            r#"<c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="C1" t="s"><v>2</v></c>"#,
        )
        .unwrap(),
    );
}

pub fn test_config(template_root: PathBuf) -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        template_root,
        storage_root: PathBuf::from("unused"),
        capability_secret: SECRET.to_string(),
        download_root: "/download".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        template_cache_ttl: Duration::from_secs(60),
        link_ttl_seconds: 900,
    }
}

/// A file store that cannot write records.
pub struct OfflineFileStore;

#[async_trait]
impl FileStore for OfflineFileStore {
    async fn insert(&self, _file: NewStoredFile) -> Result<StoredFile, StoreError> {
        Err(StoreError::Unavailable("file database offline".to_string()))
    }

    async fn find_by_id(&self, _id: i64) -> Result<Option<StoredFile>, StoreError> {
        Ok(None)
    }

    async fn touch_download(&self, _id: i64) -> Result<(), StoreError> {
        Ok(())
    }
}

/// A fully wired service over in-memory stores and a temp template root.
pub struct TestEnv {
    pub templates: TempDir,
    pub state: AppState,
    pub counters: Arc<MemoryCounterStore>,
    pub projects: Arc<MemoryProjectStore>,
    pub files: Arc<MemoryFileStore>,
    pub storage: Arc<MockObjectStorage>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::build(None, None, MockObjectStorage::new())
    }

    pub fn with_counter_store(counters: Arc<dyn CounterStore>) -> Self {
        Self::build(Some(counters), None, MockObjectStorage::new())
    }

    pub fn with_file_store(files: Arc<dyn FileStore>) -> Self {
        Self::build(None, Some(files), MockObjectStorage::new())
    }

    pub fn with_storage(storage: MockObjectStorage) -> Self {
        Self::build(None, None, storage)
    }

    fn build(
        counter_override: Option<Arc<dyn CounterStore>>,
        file_override: Option<Arc<dyn FileStore>>,
        storage: MockObjectStorage,
    ) -> Self {
        let templates = TempDir::new().unwrap();
        write_templates(templates.path());

        let counters = Arc::new(MemoryCounterStore::new());
        let projects = Arc::new(MemoryProjectStore::new());
        let files = Arc::new(MemoryFileStore::new());
        let storage = Arc::new(storage);

        let stores = Stores {
            counters: counter_override.unwrap_or_else(|| counters.clone() as Arc<dyn CounterStore>),
            projects: projects.clone(),
            files: file_override.unwrap_or_else(|| files.clone() as Arc<dyn FileStore>),
        };
        let state = AppState::with_parts(
            test_config(templates.path().to_path_buf()),
            stores,
            storage.clone(),
        );

        Self {
            templates,
            state,
            counters,
            projects,
            files,
            storage,
        }
    }

    pub fn remove_template(&self, name: &str) {
        std::fs::remove_file(self.templates.path().join(name)).unwrap();
    }

    pub fn write_template(&self, name: &str, bytes: Vec<u8>) {
        std::fs::write(self.templates.path().join(name), bytes).unwrap();
    }
}

pub fn fields(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

pub fn contract_fields(contract_type: &str) -> Map<String, Value> {
    fields(json!({
        "project_name": "Harbor Bridge",
        "contract_type": contract_type,
        "contractor_name": "Acme Builders",
        "contract_value": "1,250,000",
        "activities": [
            { "description": "Survey", "amount": "1,000" },
            { "description": "Design", "amount": 2500 }
        ]
    }))
}
