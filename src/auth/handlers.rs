use actix_web::{web, HttpResponse};

use super::capability::CapabilityClaims;
use super::middleware::AuthenticatedUser;
use super::model::LinkResponse;
use crate::db::AppState;
use crate::models::StoredFile;
use crate::storage::StorageError;
use crate::ErrorResponse;

/// Shown for every token problem so callers cannot probe which check failed.
const INVALID_LINK: &str = "This download link is invalid or has expired";

#[utoipa::path(
    context_path = "/api",
    tag = "Files",
    post,
    path = "/files/{id}/link",
    params(("id" = i64, Path, description = "Stored file id")),
    responses(
        (status = 200, description = "Download link issued", body = LinkResponse),
        (status = 401, description = "Missing identity"),
        (status = 404, description = "File not found", body = ErrorResponse),
        (status = 500, description = "Internal Server Error", body = ErrorResponse)
    )
)]
pub async fn create_download_link(
    user: AuthenticatedUser,
    path: web::Path<i64>,
    data: web::Data<AppState>,
) -> HttpResponse {
    let file_id = path.into_inner();
    log::info!("Executing create_download_link for file {} (user {})", file_id, user.id);

    let file = match data.files.find_by_id(file_id).await {
        Ok(Some(file)) if user.can_access(file.owner_id) => file,
        Ok(_) => {
            return HttpResponse::NotFound().json(ErrorResponse::not_found("File not found"));
        }
        Err(e) => {
            log::error!("Failed to load file {}: {}", file_id, e);
            return HttpResponse::InternalServerError()
                .json(ErrorResponse::internal_error("Failed to load file"));
        }
    };

    let ttl = data.config.link_ttl_seconds;
    match data
        .tokens
        .issue(file.id, file.owner_id, file.category, ttl, user.is_admin)
    {
        Ok(token) => HttpResponse::Ok().json(LinkResponse {
            url: data.tokens.download_url(&token),
            expires_in: ttl,
        }),
        Err(e) => {
            log::error!("Failed to issue link for file {}: {}", file.id, e);
            HttpResponse::InternalServerError()
                .json(ErrorResponse::internal_error("Failed to issue download link"))
        }
    }
}

/// Whether `user` may redeem a token with `claims` for `file`.
pub fn may_download(user: &AuthenticatedUser, claims: &CapabilityClaims, file: &StoredFile) -> bool {
    if file.owner_id != claims.owner_id || file.category != claims.category {
        return false;
    }
    if claims.issued_for_admin {
        return user.is_admin;
    }
    user.can_access(claims.owner_id)
}

#[utoipa::path(
    tag = "Files",
    get,
    path = "/download/{token}",
    params(("token" = String, Path, description = "Capability token from a download link")),
    responses(
        (status = 200, description = "File contents"),
        (status = 401, description = "Link invalid, expired or not yours", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse),
        (status = 500, description = "Internal Server Error", body = ErrorResponse)
    )
)]
pub async fn download_file(
    user: AuthenticatedUser,
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> HttpResponse {
    let token = path.into_inner();

    let claims = match data.tokens.verify(&token) {
        Ok(claims) => claims,
        Err(e) => {
            log::warn!("Download by user {} rejected: {}", user.id, e);
            return HttpResponse::Unauthorized().json(ErrorResponse::unauthorized(INVALID_LINK));
        }
    };

    let file = match data.files.find_by_id(claims.file_id).await {
        Ok(Some(file)) => file,
        Ok(None) => {
            return HttpResponse::NotFound().json(ErrorResponse::not_found("File not found"));
        }
        Err(e) => {
            log::error!("Failed to load file {}: {}", claims.file_id, e);
            return HttpResponse::InternalServerError()
                .json(ErrorResponse::internal_error("Failed to load file"));
        }
    };

    if !may_download(&user, &claims, &file) {
        log::warn!(
            "User {} presented a link for file {} owned by {}",
            user.id,
            file.id,
            file.owner_id
        );
        return HttpResponse::Unauthorized().json(ErrorResponse::unauthorized(INVALID_LINK));
    }

    let bytes = match data.storage.download_file(&file.storage_path).await {
        Ok(bytes) => bytes,
        Err(StorageError::NotFound(_)) => {
            log::error!("File {} is recorded but missing from storage", file.id);
            return HttpResponse::NotFound().json(ErrorResponse::not_found("File not found"));
        }
        Err(e) => {
            log::error!("Failed to read file {}: {}", file.id, e);
            return HttpResponse::InternalServerError()
                .json(ErrorResponse::internal_error("Failed to read file"));
        }
    };

    if let Err(e) = data.files.touch_download(file.id).await {
        log::warn!("Failed to record download of file {}: {}", file.id, e);
    }
    log::info!("User {} downloaded file {}", user.id, file.id);

    let mime = mime_guess::from_ext(&file.extension).first_or_octet_stream();
    let file_name = sanitize_filename::sanitize(&file.original_file_name).replace('"', "");
    HttpResponse::Ok()
        .content_type(mime.as_ref())
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", file_name),
        ))
        .body(bytes)
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/files/{id}/link").route(web::post().to(create_download_link)),
    );
}
