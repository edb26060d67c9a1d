//! HTTP surface of the deployer.
//!
//! # Endpoints
//!
//! - `POST /webhook` - Starts a deployment for the site named in the payload
//! - `GET /health` - Liveness probe
//! - `GET /deployments` - Active and recent runs
//! - `GET /deployments/{site_id}` - Latest run for one site

use siteferry_deployer::Deployer;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod health;
pub mod status;
pub mod webhook;

pub use health::health_handler;
pub use status::{list_handler, show_handler};
pub use webhook::webhook_handler;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    deployer: Arc<Deployer>,
}

impl AppState {
    pub fn new(deployer: Arc<Deployer>) -> Self {
        AppState { deployer }
    }

    pub fn deployer(&self) -> &Arc<Deployer> {
        &self.deployer
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .route("/deployments", get(list_handler))
        .route("/deployments/{site_id}", get(show_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use siteferry_core::{FetchStrategy, Settings, SiteId};
    use std::net::TcpListener;
    use tempfile::TempDir;
    use tower::ServiceExt;

    /// Keeps the fixtures a test app depends on alive.
    struct TestApp {
        router: axum::Router,
        state: AppState,
        // Accepts connections but never answers, so runs stay in progress
        _source_api: TcpListener,
        _work_dir: TempDir,
    }

    fn test_app() -> TestApp {
        let source_api = TcpListener::bind("127.0.0.1:0").unwrap();
        let work_dir = tempfile::tempdir().unwrap();

        let mut settings = Settings::default();
        settings.source.api_token = "wf-token".to_string();
        settings.source.api_url = format!("http://{}", source_api.local_addr().unwrap());
        settings.source.publish_domain = "example.webflow.io".to_string();
        settings.destination.api_key = "pk1".to_string();
        settings.destination.secret_key = "sk1".to_string();
        settings.destination.domain = "example.com".to_string();
        settings.deploy.fetch_strategy = FetchStrategy::Export;
        settings.deploy.work_dir = Some(work_dir.path().to_path_buf());

        let deployer = Arc::new(Deployer::from_settings(&settings).unwrap());
        let state = AppState::new(deployer);

        TestApp {
            router: build_router(state.clone()),
            state,
            _source_api: source_api,
            _work_dir: work_dir,
        }
    }

    fn post_webhook(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    // ─── Health ───

    #[tokio::test]
    async fn health_returns_healthy() {
        let app = test_app();
        let (status, body) = send(&app, get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "healthy" }));
    }

    // ─── Webhook ───

    #[tokio::test]
    async fn webhook_starts_deployment() {
        let app = test_app();
        let body = json!({ "payload": { "siteId": "abc123" } }).to_string();

        let (status, body) = send(&app, post_webhook(body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "message": "Deployment started", "site_id": "abc123" })
        );
        let site = SiteId::parse("abc123").unwrap();
        assert!(app.state.deployer().registry().is_active(&site));
    }

    #[tokio::test]
    async fn second_webhook_for_active_site_is_rejected() {
        let app = test_app();
        let body = json!({ "site_id": "abc123" }).to_string();

        let (_, first) = send(&app, post_webhook(body.clone())).await;
        let (status, second) = send(&app, post_webhook(body)).await;

        assert_eq!(first["message"], "Deployment started");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second, json!({ "message": "Deployment already in progress" }));
        assert_eq!(app.state.deployer().registry().active_count(), 1);
    }

    #[tokio::test]
    async fn webhook_without_site_id_is_bad_request() {
        let app = test_app();

        let (status, body) = send(&app, post_webhook("{}")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "No site ID provided" }));
        assert_eq!(app.state.deployer().registry().active_count(), 0);
    }

    #[tokio::test]
    async fn webhook_without_json_is_bad_request() {
        let app = test_app();

        for body in ["", "not json", "null"] {
            let (status, response) = send(&app, post_webhook(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(response, json!({ "error": "No JSON data received" }));
        }
    }

    // ─── Status ───

    #[tokio::test]
    async fn deployments_lists_active_runs() {
        let app = test_app();
        send(&app, post_webhook(json!({ "siteId": "abc123" }).to_string())).await;

        let (status, body) = send(&app, get("/deployments")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active"][0]["site_id"], "abc123");
        assert_eq!(body["recent"], json!([]));
    }

    #[tokio::test]
    async fn deployment_status_for_site() {
        let app = test_app();
        send(&app, post_webhook(json!({ "siteId": "abc123" }).to_string())).await;

        let (status, body) = send(&app, get("/deployments/abc123")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["site_id"], "abc123");
        assert!(body.get("outcome").is_none());

        let (status, body) = send(&app, get("/deployments/unknown")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No deployment recorded for site unknown");
    }
}
