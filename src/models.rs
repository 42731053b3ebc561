use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema, sqlx::FromRow)]
pub struct Project {
    #[schema(example = 42)]
    pub id: i64,
    #[schema(example = 7)]
    pub owner_id: i64,
    #[schema(example = "Harbor Bridge Rehabilitation")]
    pub name: String,
    #[schema(example = "Created automatically while generating a contract")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Document,
    Attachment,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Attachment => "attachment",
        }
    }
}

impl TryFrom<String> for FileCategory {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "document" => Ok(Self::Document),
            "attachment" => Ok(Self::Attachment),
            other => Err(format!("unknown file category `{other}`")),
        }
    }
}

impl std::fmt::Display for FileCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema, sqlx::FromRow)]
pub struct StoredFile {
    pub id: i64,
    pub owner_id: i64,
    pub project_id: i64,
    #[schema(example = "Contract ABS01.docx")]
    pub original_file_name: String,
    #[schema(example = "documents/0f8e..._Contract_ABS01.docx")]
    pub storage_path: String,
    #[schema(example = "docx")]
    pub extension: String,
    #[sqlx(try_from = "String")]
    pub category: FileCategory,
    pub created_at: DateTime<Utc>,
    pub last_downloaded_at: Option<DateTime<Utc>>,
}

/// Values for a new `stored_files` row.
#[derive(Debug, Clone)]
pub struct NewStoredFile {
    pub owner_id: i64,
    pub project_id: i64,
    pub original_file_name: String,
    pub storage_path: String,
    pub extension: String,
    pub category: FileCategory,
}
