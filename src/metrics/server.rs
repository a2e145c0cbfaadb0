//! HTTP server for the Prometheus metrics endpoint.

use crate::metrics::MetricsRegistry;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tower_http::cors::CorsLayer;

/// Errors that can occur during metrics server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener or runtime could not be set up.
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    /// The server exited with an error.
    #[error("server error: {0}")]
    Server(String),
}

/// Configuration for the metrics server.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self::with_port(9090)
    }
}

impl MetricsServerConfig {
    /// Creates a config with a custom port.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], port).into(),
        }
    }
}

/// Serves `/metrics` and `/health` from a shared registry.
///
/// The registry is updated by the frame loop; the server only reads it.
pub struct MetricsServer {
    config: MetricsServerConfig,
    registry: Arc<MetricsRegistry>,
}

impl MetricsServer {
    /// Creates a server over a shared registry.
    pub fn new(config: MetricsServerConfig, registry: Arc<MetricsRegistry>) -> Self {
        Self { config, registry }
    }

    /// Runs the server until it fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.registry);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Metrics server listening");

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))
    }

    /// Runs the server on a dedicated thread with its own runtime.
    ///
    /// Failures after the thread starts, such as a port already in use, are
    /// logged from that thread and also returned through the handle.
    pub fn spawn(self) -> Result<JoinHandle<Result<(), ServerError>>, ServerError> {
        let handle = thread::Builder::new()
            .name("metrics-server".into())
            .spawn(move || {
                let result = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .enable_io()
                    .build()
                    .map_err(ServerError::from)
                    .and_then(|runtime| runtime.block_on(self.run()));
                if let Err(e) = &result {
                    tracing::error!(error = %e, "Metrics server stopped");
                }
                result
            })?;
        Ok(handle)
    }
}

async fn metrics_handler(State(registry): State<Arc<MetricsRegistry>>) -> impl IntoResponse {
    match registry.encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        assert_eq!(MetricsServerConfig::default().bind_addr.port(), 9090);
    }

    #[test]
    fn test_config_with_port() {
        assert_eq!(MetricsServerConfig::with_port(8080).bind_addr.port(), 8080);
    }

    #[test]
    fn test_spawn_reports_port_in_use() {
        let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let registry = Arc::new(MetricsRegistry::new().unwrap());
        let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry);
        let result = server.spawn().unwrap().join().unwrap();
        assert!(matches!(result, Err(ServerError::Bind(_))));
    }
}
