//! Liveness endpoint.

use axum::Json;
use serde_json::{Value, json};

/// Always `{"status": "healthy"}` while the process is serving.
pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
