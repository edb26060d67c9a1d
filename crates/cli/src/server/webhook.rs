//! Webhook endpoint: accepts site publish notifications and starts a
//! deployment for the referenced site.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use siteferry_core::SiteId;
use siteferry_deployer::DeployError;
use thiserror::Error;
use tracing::{error, info};

use super::AppState;

/// Reasons a webhook is refused.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Body missing or not a JSON document
    #[error("No JSON data received")]
    NoJson,

    /// No usable site identifier in the payload
    #[error("No site ID provided")]
    MissingSiteId,

    /// The deployment could not be started
    #[error("{0}")]
    Dispatch(DeployError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::NoJson | WebhookError::MissingSiteId => StatusCode::BAD_REQUEST,
            WebhookError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Pull the site ID out of a webhook payload.
///
/// Looked up in order: `payload.siteId`, `site.id`, `site_id`, `siteId`.
/// Empty strings are skipped.
pub fn extract_site_id(body: &Value) -> Option<SiteId> {
    [
        body.pointer("/payload/siteId"),
        body.pointer("/site/id"),
        body.get("site_id"),
        body.get("siteId"),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .find_map(SiteId::parse)
}

fn already_in_progress() -> Json<Value> {
    Json(json!({ "message": "Deployment already in progress" }))
}

/// Webhook handler.
///
/// Responds as soon as the deployment is dispatched; the run itself continues
/// in the background and its result is visible under `/deployments`.
pub async fn webhook_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, WebhookError> {
    let payload: Value = serde_json::from_slice(&body).map_err(|_| WebhookError::NoJson)?;
    if payload.is_null() {
        return Err(WebhookError::NoJson);
    }

    let site_id = extract_site_id(&payload).ok_or(WebhookError::MissingSiteId)?;
    info!(site_id = %site_id, "Webhook received");

    let deployer = state.deployer();

    // Fast path only; dispatch does the authoritative claim
    if deployer.registry().is_active(&site_id) {
        info!(site_id = %site_id, "Deployment already in progress");
        return Ok(already_in_progress());
    }

    match deployer.dispatch(site_id.clone()) {
        Ok(()) => Ok(Json(json!({
            "message": "Deployment started",
            "site_id": site_id,
        }))),
        Err(e) if e.is_duplicate() => {
            info!(site_id = %site_id, "Deployment already in progress");
            Ok(already_in_progress())
        }
        Err(e) => {
            error!(site_id = %site_id, error = %e, "Failed to start deployment");
            Err(WebhookError::Dispatch(e))
        }
    }
}
