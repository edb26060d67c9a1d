use anyhow::{Context, Result};
use siteferry_core::Settings;
use siteferry_deployer::Deployer;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::server::{AppState, build_router};

/// Run the webhook receiver until Ctrl-C.
///
/// `host` and `port` override the `[server]` settings when given.
pub async fn run(config: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut settings = Settings::load(config).context("Failed to load settings")?;
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }

    let deployer =
        Arc::new(Deployer::from_settings(&settings).context("Failed to set up deployer")?);
    let app = build_router(AppState::new(deployer));

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(
        address = %addr,
        destination = %settings.destination.domain,
        strategy = ?settings.deploy.fetch_strategy,
        "Webhook receiver listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Webhook receiver stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        // Without a signal handler, keep serving
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
