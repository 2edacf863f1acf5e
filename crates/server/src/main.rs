// Parley API server
// Decision: In-memory storage, scripted responder; both swappable behind core traits

use std::sync::Arc;

use anyhow::{Context, Result};
use parley_core::telemetry::{init_telemetry, TelemetryConfig};
use parley_server::responder::MockResponder;
use parley_server::storage::Storage;
use parley_server::{build_app, ServerConfig, Services};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present; real environment wins
    let _ = dotenvy::dotenv();

    // Configure via environment variables:
    // - RUST_LOG / LOG_LEVEL: Log filter (default: "parley_server=debug,tower_http=debug")
    // - PARLEY_LOG_FORMAT: "text" or "json"
    let mut telemetry_config = TelemetryConfig::from_env()
        .with_service_name("parley-server")
        .with_default_filter("parley_server=debug,tower_http=debug");
    telemetry_config.service_version = Some(env!("CARGO_PKG_VERSION").to_string());
    init_telemetry(&telemetry_config);

    tracing::info!("parley-server starting...");

    let config = ServerConfig::from_env();
    if !config.api_prefix.is_empty() {
        tracing::info!(prefix = %config.api_prefix, "API prefix configured");
    }
    if config.cors_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS origins configured");
    }
    tracing::info!(
        delays_ms = ?config
            .responder
            .delays
            .iter()
            .map(|d| d.as_millis())
            .collect::<Vec<_>>(),
        timeout = ?config.responder.timeout,
        after_cap = config.history_after_cap,
        demo_flow = %config.demo_flow_path.display(),
        "Responder configured"
    );

    let services = Services::new(Storage::in_memory(), Arc::new(MockResponder::new()), &config);
    let app = build_app(&services, &config);

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.addr))?;
    tracing::info!("HTTP server listening on {}", config.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("parley-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
