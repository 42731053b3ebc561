use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, ResponseError};
use futures_util::TryStreamExt;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

use super::{DocumentKind, GenerationRequest, GenerationResponse, SignatureInput};
use crate::auth::middleware::AuthenticatedUser;
use crate::db::AppState;
use crate::ErrorResponse;

const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;
const MAX_SIGNATURE_BYTES: usize = 5 * 1024 * 1024;

/// The JSON `payload` part of a generation form.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationPayload {
    pub project_id: Option<i64>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub fields: Map<String, Value>,
    /// `data:image/png;base64,...` from a drawing canvas.
    pub signature_data_uri: Option<String>,
}

#[derive(ToSchema)]
pub struct GenerateDocumentForm {
    /// JSON-encoded `GenerationPayload`.
    #[allow(unused)]
    pub payload: String,
    #[allow(unused)]
    #[schema(value_type = Option<String>, format = Binary)]
    pub signature: Option<Vec<u8>>,
}

async fn read_part(field: &mut actix_multipart::Field, limit: usize) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(|e| e.to_string())? {
        if bytes.len() + chunk.len() > limit {
            return Err(format!("part exceeds {} bytes", limit));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Read the `payload` and optional `signature` parts.
async fn read_generation_form(
    mut payload: Multipart,
) -> Result<(GenerationPayload, Option<Vec<u8>>), String> {
    let mut parsed: Option<GenerationPayload> = None;
    let mut signature: Option<Vec<u8>> = None;

    while let Some(mut field) = payload.try_next().await.map_err(|e| e.to_string())? {
        let content_disposition = field
            .content_disposition()
            .ok_or("Content-Disposition not set")?;
        let field_name = content_disposition
            .get_name()
            .ok_or_else(|| "No field name".to_string())?
            .to_string();
        let has_filename = content_disposition
            .get_filename()
            .is_some_and(|name| !name.is_empty());

        match field_name.as_str() {
            "payload" => {
                let bytes = read_part(&mut field, MAX_PAYLOAD_BYTES).await?;
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| format!("payload is not valid JSON: {}", e))?;
                parsed = Some(value);
            }
            "signature" => {
                let bytes = read_part(&mut field, MAX_SIGNATURE_BYTES).await?;
                // An empty part without a file name is an unused file input.
                if has_filename || !bytes.is_empty() {
                    signature = Some(bytes);
                }
            }
            _ => {
                continue;
            }
        }
    }

    match parsed {
        Some(payload) => Ok((payload, signature)),
        None => Err("The payload part is required".to_string()),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Documents",
    post,
    path = "/documents/{kind}",
    params(
        ("kind" = String, Path, description = "contract, approval-letter, terms-of-reference or project-summary")
    ),
    request_body(content = inline(GenerateDocumentForm), content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Document generated", body = GenerationResponse),
        (status = 400, description = "Invalid fields or signature", body = ErrorResponse),
        (status = 401, description = "Missing identity"),
        (status = 404, description = "Unknown document kind or project", body = ErrorResponse),
        (status = 500, description = "Template, storage or record failure", body = ErrorResponse),
        (status = 503, description = "Contract numbering unavailable, retry", body = ErrorResponse)
    )
)]
pub async fn generate_document(
    user: AuthenticatedUser,
    path: web::Path<String>,
    payload: Multipart,
    data: web::Data<AppState>,
) -> HttpResponse {
    let slug = path.into_inner();
    info!("Executing generate_document handler for {} (user {})", slug, user.id);

    let Some(kind) = DocumentKind::from_slug(&slug) else {
        return HttpResponse::NotFound()
            .json(ErrorResponse::not_found(&format!("Unknown document kind '{}'", slug)));
    };

    let (form, upload) = match read_generation_form(payload).await {
        Ok(parts) => parts,
        Err(e) => {
            warn!("Rejected generation form: {}", e);
            return HttpResponse::BadRequest().json(ErrorResponse::bad_request(&e));
        }
    };
    debug!(
        "Generation form: {} field(s), project {:?}, upload {}",
        form.fields.len(),
        form.project_id,
        upload.is_some()
    );

    let request = GenerationRequest {
        owner_id: user.id,
        kind,
        project_id: form.project_id,
        fields: form.fields,
        signature: SignatureInput {
            upload,
            data_uri: form.signature_data_uri,
        },
    };

    match data.orchestrator.generate(request).await {
        Ok(outcome) => HttpResponse::Created().json(GenerationResponse::from(&outcome)),
        Err(e) => {
            warn!("Generation of {} failed with {}: {}", kind, e.code(), e);
            e.error_response()
        }
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/documents/{kind}").route(web::post().to(generate_document)),
    );
}
