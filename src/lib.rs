pub mod api;
pub mod config;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::rename_service::RenameService;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::get,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::rename::upload_form,
        api::handlers::rename::rename_upload,
        api::handlers::downloads::download_file,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::rename::RenameForm,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "rename", description = "Upload, rename and publish PDFs"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub rename_service: Arc<RenameService>,
    pub config: AppConfig,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/",
            get(api::handlers::rename::upload_form).post(api::handlers::rename::rename_upload),
        )
        .route(
            "/downloads/:filename",
            get(api::handlers::downloads::download_file),
        )
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(DefaultBodyLimit::max(state.config.max_file_size))
        .with_state(state)
}
