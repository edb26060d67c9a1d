//! Deployment status endpoints, backed by the in-memory registry.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use siteferry_core::SiteId;
use siteferry_deployer::RegistrySnapshot;

use super::AppState;

/// Active runs plus the recent history, newest first.
pub async fn list_handler(State(state): State<AppState>) -> Json<RegistrySnapshot> {
    Json(state.deployer().registry().snapshot())
}

/// The active or most recent run for one site.
pub async fn show_handler(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
) -> Response {
    let run = SiteId::parse(&site_id).and_then(|id| state.deployer().registry().latest(&id));

    match run {
        Some(run) => Json(run).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("No deployment recorded for site {}", site_id) })),
        )
            .into_response(),
    }
}
