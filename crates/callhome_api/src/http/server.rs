use crate::domain::TelemetryService;
use crate::http::{health, retrieve_summary, retrieve_telemetry, save_telemetry, serve_dashboard};
use anyhow::Context;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory served under `/static`
    pub static_dir: PathBuf,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8855,
            static_dir: PathBuf::from("crates/callhome_all_in_one/web/static"),
        }
    }
}

pub fn build_router(service: Arc<TelemetryService>, static_dir: impl Into<PathBuf>) -> Router {
    Router::new()
        .route("/", get(serve_dashboard))
        .route("/health", get(health))
        .route("/telemetry", get(retrieve_telemetry).post(save_telemetry))
        .route("/telemetry/summary", get(retrieve_summary))
        .nest_service("/static", ServeDir::new(static_dir.into()))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve the API until `cancellation_token` fires, then drain in-flight
/// requests and return.
pub async fn run_http_server(
    config: HttpServerConfig,
    service: Arc<TelemetryService>,
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid server address {}:{}", config.host, config.port))?;

    let app = build_router(service, config.static_dir);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(address = %addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancellation_token.cancelled().await;
            debug!("HTTP server shutdown signal received");
        })
        .await
        .context("HTTP server failed")?;

    info!("HTTP server stopped");
    Ok(())
}
