//! Document generation - per document kind assembly of validated fields,
//! template, numbering, rendering, storage and project attachment.
//!
//! - `kind` - the supported document kinds and their templates
//! - `documents` - per-kind field rules and render scope assembly
//! - `validation` - field validation errors
//! - `signature` - signature upload / data URI decoding
//! - `common` - date and amount formatting
//! - `orchestrator` - the generation pipeline
//! - `handlers` - HTTP surface

pub mod common;
pub mod documents;
pub mod handlers;
pub mod kind;
pub mod orchestrator;
pub mod signature;
pub mod validation;

pub use kind::DocumentKind;
pub use orchestrator::{GenerationOrchestrator, GenerationOutcome, GenerationRequest};
pub use signature::SignatureInput;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::db::StoreError;
use crate::models::Project;
use crate::numbering::NumberingError;
use crate::project::ProjectError;
use crate::storage::StorageError;
use crate::template::TemplateError;
use crate::ErrorResponse;

/// Why a generation request failed. Each variant maps to a stable code.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{0}")]
    Validation(String),
    #[error("template is malformed: {0}")]
    TemplateStructure(#[source] TemplateError),
    #[error("template is unavailable: {0}")]
    TemplateUnavailable(#[source] TemplateError),
    #[error("signature image is invalid: {0}")]
    ImagePayload(String),
    #[error("contract numbering is temporarily unavailable")]
    NumberingUnavailable(#[source] NumberingError),
    #[error("failed to store the generated document")]
    StorageWrite(#[source] StorageError),
    #[error("{0}")]
    ProjectResolution(#[source] ProjectError),
    #[error("failed to record the generated document")]
    Record(#[source] StoreError),
    #[error("document rendering failed unexpectedly: {0}")]
    Internal(String),
}

impl GenerationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::TemplateStructure(_) => "TEMPLATE_STRUCTURE_ERROR",
            Self::TemplateUnavailable(_) => "TEMPLATE_UNAVAILABLE",
            Self::ImagePayload(_) => "IMAGE_PAYLOAD_ERROR",
            Self::NumberingUnavailable(_) => "NUMBERING_UNAVAILABLE",
            Self::StorageWrite(_) => "STORAGE_WRITE_ERROR",
            Self::ProjectResolution(_) => "PROJECT_RESOLUTION_ERROR",
            Self::Record(_) => "RECORD_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the same request may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NumberingUnavailable(_))
    }
}

impl From<TemplateError> for GenerationError {
    fn from(error: TemplateError) -> Self {
        match error {
            TemplateError::NotFound(_) | TemplateError::InvalidName(_) | TemplateError::Io { .. } => {
                Self::TemplateUnavailable(error)
            }
            other => Self::TemplateStructure(other),
        }
    }
}

impl ResponseError for GenerationError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::ImagePayload(_) => StatusCode::BAD_REQUEST,
            Self::NumberingUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ProjectResolution(ProjectError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::ProjectResolution(ProjectError::Forbidden(_)) => StatusCode::FORBIDDEN,
            Self::ProjectResolution(ProjectError::MissingName) => StatusCode::BAD_REQUEST,
            Self::ProjectResolution(ProjectError::Store(_))
            | Self::TemplateStructure(_)
            | Self::TemplateUnavailable(_)
            | Self::StorageWrite(_)
            | Self::Record(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = ErrorResponse::new(self.code(), &self.to_string());
        body.retryable = self.is_retryable();
        HttpResponse::build(self.status_code()).json(body)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectSummary {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

impl From<&Project> for ProjectSummary {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id,
            name: project.name.clone(),
            description: project.description.clone(),
        }
    }
}

/// Success envelope for a generated document.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    pub success: bool,
    #[schema(example = "documents/0f8e..._Contract_ABS01_Harbor_Bridge.docx")]
    pub storage_path: String,
    pub project: ProjectSummary,
    pub file_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "ABS01")]
    pub contract_number: Option<String>,
}

impl From<&GenerationOutcome> for GenerationResponse {
    fn from(outcome: &GenerationOutcome) -> Self {
        Self {
            success: true,
            storage_path: outcome.file.storage_path.clone(),
            project: ProjectSummary::from(&outcome.project),
            file_id: outcome.file.id,
            contract_number: outcome.contract_number.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn test_template_errors_split_by_availability() {
        let missing: GenerationError = TemplateError::NotFound("contract.docx".into()).into();
        assert_eq!(missing.code(), "TEMPLATE_UNAVAILABLE");

        let broken: GenerationError = TemplateError::Structure {
            part: "word/document.xml".into(),
            message: "unclosed tag".into(),
        }
        .into();
        assert_eq!(broken.code(), "TEMPLATE_STRUCTURE_ERROR");
        assert_eq!(broken.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_only_numbering_is_retryable() {
        let numbering = GenerationError::NumberingUnavailable(NumberingError::Unavailable(
            StoreError::Unavailable("down".into()),
        ));
        assert!(numbering.is_retryable());
        assert_eq!(numbering.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!GenerationError::Validation("x".into()).is_retryable());
    }

    #[actix_web::test]
    async fn test_error_envelope_shape() {
        let error = GenerationError::ImagePayload("empty payload".into());
        let response = error.error_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "IMAGE_PAYLOAD_ERROR");
        assert_eq!(json["retryable"], false);
        assert!(json["message"].as_str().unwrap().contains("empty payload"));
        assert!(json["timestamp"].is_string());
    }
}
