//! The generation pipeline.
//!
//! Steps run strictly in order: validate, check an explicit project, decode
//! the signature, load the template, consume a contract number, render,
//! store the bytes, resolve the project, record the file. Everything that
//! can reject the request without side effects runs before the counter is
//! touched. A stored file whose project or record step fails is discarded.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::common::{self, SIGNATURE_FALLBACK, SIGNATURE_HEIGHT_PX, SIGNATURE_WIDTH_PX};
use super::documents::{self, ScopeExtras, PROJECT_NAME, SIGNATURE_TAG};
use super::{DocumentKind, GenerationError, SignatureInput};
use crate::db::FileStore;
use crate::models::{FileCategory, NewStoredFile, Project, StoredFile};
use crate::numbering::ContractNumberingService;
use crate::persist::DocumentPersistor;
use crate::project::{ProjectError, ProjectResolver};
use crate::shaping::shape;
use crate::template::{
    FieldResolver, ImageEmbedModule, LoadedTemplate, PlaceholderEngine, RenderedDocument,
    SpreadsheetRenderer, TemplateFormat, TemplateStore,
};

/// One document to generate for a verified user.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub owner_id: i64,
    pub kind: DocumentKind,
    pub project_id: Option<i64>,
    pub fields: Map<String, Value>,
    pub signature: SignatureInput,
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub project: Project,
    pub file: StoredFile,
    pub contract_number: Option<String>,
}

#[derive(Clone)]
pub struct GenerationOrchestrator {
    templates: TemplateStore,
    numbering: ContractNumberingService,
    persistor: DocumentPersistor,
    projects: ProjectResolver,
    files: Arc<dyn FileStore>,
}

impl GenerationOrchestrator {
    pub fn new(
        templates: TemplateStore,
        numbering: ContractNumberingService,
        persistor: DocumentPersistor,
        projects: ProjectResolver,
        files: Arc<dyn FileStore>,
    ) -> Self {
        Self {
            templates,
            numbering,
            persistor,
            projects,
            files,
        }
    }

    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationOutcome, GenerationError> {
        let GenerationRequest {
            owner_id,
            kind,
            project_id,
            mut fields,
            signature,
        } = request;
        log::info!("Generating {} for user {}", kind, owner_id);

        documents::validate(kind, &fields, project_id.is_some())
            .map_err(GenerationError::Validation)?;

        let explicit = match project_id {
            Some(id) => Some(
                self.projects
                    .verify_explicit(owner_id, id)
                    .await
                    .map_err(project_error)?,
            ),
            None => None,
        };
        if let Some(project) = &explicit {
            if project_name(&fields).is_empty() {
                fields.insert(PROJECT_NAME.to_string(), Value::String(project.name.clone()));
            }
        }

        let signature = signature.decode()?;
        let signature = signature.filter(|_| kind.accepts_signature());

        let contract_type = match kind {
            DocumentKind::Contract => documents::contract_type(&fields),
            _ => None,
        };
        let (template_name, fallback) = kind.template_names(contract_type.as_deref());
        let template = self.templates.load(&template_name, fallback).await?;
        log::debug!("Using template {} for {}", template.name, kind);

        let contract_number = match &contract_type {
            Some(code) => Some(
                self.numbering
                    .contract_number(code)
                    .await
                    .map_err(GenerationError::NumberingUnavailable)?,
            ),
            None => None,
        };

        let scope = documents::build_scope(
            kind,
            &fields,
            ScopeExtras {
                date: common::today(),
                contract_number: contract_number.as_deref(),
            },
        );
        let rendered = render(kind, template, scope, signature).await?;

        let project_name = project_name(&fields);
        let display_name = display_name(kind, contract_number.as_deref(), &project_name);
        let storage_path = self
            .persistor
            .save(&rendered.bytes, &display_name, rendered.extension)
            .await
            .map_err(|e| {
                log::error!("Failed to store generated {}: {}", kind, e);
                GenerationError::StorageWrite(e)
            })?;

        let project = match explicit {
            Some(project) => project,
            None => match self
                .projects
                .resolve(owner_id, &project_name, None, kind.label())
                .await
            {
                Ok(project) => project,
                Err(e) => {
                    self.persistor.discard(&storage_path).await;
                    return Err(project_error(e));
                }
            },
        };

        let file = match self
            .files
            .insert(NewStoredFile {
                owner_id,
                project_id: project.id,
                original_file_name: format!("{}.{}", display_name, rendered.extension),
                storage_path: storage_path.clone(),
                extension: rendered.extension.to_string(),
                category: FileCategory::Document,
            })
            .await
        {
            Ok(file) => file,
            Err(e) => {
                log::error!("Failed to record generated {}: {}", kind, e);
                self.persistor.discard(&storage_path).await;
                return Err(GenerationError::Record(e));
            }
        };

        log::info!(
            "Generated {} as file {} in project {} for user {}",
            kind,
            file.id,
            project.id,
            owner_id
        );

        Ok(GenerationOutcome {
            project,
            file,
            contract_number,
        })
    }
}

fn project_error(error: ProjectError) -> GenerationError {
    match error {
        ProjectError::Forbidden(id) => {
            GenerationError::Validation(format!("project {} is not available to you", id))
        }
        ProjectError::MissingName => GenerationError::Validation(error.to_string()),
        other => GenerationError::ProjectResolution(other),
    }
}

fn project_name(fields: &Map<String, Value>) -> String {
    match fields.get(PROJECT_NAME) {
        Some(Value::String(name)) => shape(name),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// "Contract ABS01 Harbor Bridge", on one line.
fn display_name(kind: DocumentKind, contract_number: Option<&str>, project_name: &str) -> String {
    [kind.title(), contract_number.unwrap_or_default(), project_name]
        .iter()
        .flat_map(|part| part.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

async fn render(
    kind: DocumentKind,
    template: LoadedTemplate,
    scope: Value,
    signature: Option<Arc<[u8]>>,
) -> Result<RenderedDocument, GenerationError> {
    let free_text = documents::rules(kind).free_text;

    let rendered = tokio::task::spawn_blocking(move || match template.format {
        TemplateFormat::Docx => {
            let mut resolver = FieldResolver::new()
                .with_free_text(free_text.iter().copied())
                .with_free_text([SIGNATURE_TAG])
                .with_override(SIGNATURE_TAG, SIGNATURE_FALLBACK);

            if let Some(bytes) = signature {
                let mut images = HashMap::new();
                images.insert(SIGNATURE_TAG.to_string(), bytes);
                resolver = resolver.with_images(
                    ImageEmbedModule::new(images, SIGNATURE_WIDTH_PX, SIGNATURE_HEIGHT_PX)
                        .bind(SIGNATURE_TAG),
                );
            }

            PlaceholderEngine::new().render(&template.bytes, &scope, &resolver)
        }
        TemplateFormat::Xlsx => SpreadsheetRenderer::new().render(&template.bytes, &scope),
    })
    .await
    .map_err(|e| render_task_failed(kind, e))?;

    rendered.map_err(|e| {
        log::warn!("Rendering {} failed: {}", kind, e);
        GenerationError::from(e)
    })
}

fn render_task_failed(kind: DocumentKind, error: tokio::task::JoinError) -> GenerationError {
    log::error!("Render task for {} failed: {}", kind, error);
    GenerationError::Internal(error.to_string())
}
