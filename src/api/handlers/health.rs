use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub staging: String,
    pub output: String,
    pub drive: String,
    pub model: String,
    pub version: String,
}

fn dir_status(exists: bool) -> String {
    if exists { "ready" } else { "missing" }.to_string()
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let staging = tokio::fs::metadata(state.rename_service.upload_dir())
        .await
        .is_ok_and(|m| m.is_dir());
    let output = tokio::fs::metadata(state.rename_service.output().root())
        .await
        .is_ok_and(|m| m.is_dir());

    let drive = if state.config.google.is_some() {
        "configured"
    } else {
        "not configured"
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        staging: dir_status(staging),
        output: dir_status(output),
        drive: drive.to_string(),
        model: state.config.openai_model.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
