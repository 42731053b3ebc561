use actix_cors::Cors;
use actix_web::middleware::Compress;
use actix_web::{http::header, web, App, HttpServer};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod config;
pub mod db;
pub mod generation;
pub mod models;
pub mod numbering;
pub mod persist;
pub mod project;
pub mod shaping;
pub mod storage;
pub mod template;

pub use crate::config::AppConfig;
pub use crate::db::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
    /// True when the same request may succeed later.
    pub retryable: bool,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_type: &str, message: &str) -> Self {
        Self {
            success: false,
            error: error_type.to_string(),
            message: message.to_string(),
            retryable: false,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self::new("NotFound", message)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new("BadRequest", message)
    }

    pub fn unauthorized(message: &str) -> Self {
        Self::new("Unauthorized", message)
    }

    pub fn internal_error(message: &str) -> Self {
        Self::new("InternalServerError", message)
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::generation::handlers::generate_document,
        crate::auth::handlers::create_download_link,
        crate::auth::handlers::download_file
    ),
    components(
        schemas(
            generation::GenerationResponse,
            generation::ProjectSummary,
            generation::DocumentKind,
            generation::handlers::GenerationPayload,
            auth::LinkResponse,
            models::Project,
            models::StoredFile,
            models::FileCategory,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Documents", description = "Document generation endpoints."),
        (name = "Files", description = "Download link and download endpoints.")
    ),
    servers(
        (url = "http://127.0.0.1:8080", description = "Localhost server")
    )
)]
pub struct ApiDoc;

/// Register every route on an app. Shared by `run()` and the HTTP tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(generation::handlers::config)
            .configure(auth::handlers::config),
    )
    .service(
        web::resource("/download/{token}").route(web::get().to(auth::handlers::download_file)),
    );
}

pub async fn run() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env()?;
    let bind_addr = config.bind_addr.clone();

    let app_state = match AppState::new(config).await {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            log::error!("Failed to connect to database. Please check your DATABASE_URL in .env and ensure the database is running. Error: {}", e);
            return Err(e.into());
        }
    };

    log::info!("Starting server at http://{}", bind_addr);

    HttpServer::new(move || {
        let app_state = app_state.clone();
        let cors = Cors::default()
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://localhost:8080")
            .allowed_origin("http://127.0.0.1:8080")
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
                header::HeaderName::from_static("x-user-id"),
                header::HeaderName::from_static("x-user-role"),
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Compress::default())
            .wrap(cors)
            .app_data(app_state)
            .configure(configure)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
    })
    .backlog(8192)
    .max_connections(25000)
    .keep_alive(actix_web::http::KeepAlive::Os)
    .bind(bind_addr)?
    .run()
    .await?;

    Ok(())
}
