//! # Health Checking
//!
//! Readiness endpoint polled by the kubelet. The sidecar is ready as soon as
//! its gRPC socket is bound, so the handler has no dependencies to probe.

use std::net::SocketAddr;

use axum::{http::StatusCode, routing::get, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::{ProviderError, Result};

/// Path of the readiness probe
pub const READY_PATH: &str = "/health/ready";

/// Router serving the readiness probe
pub fn health_router() -> Router {
    Router::new().route(READY_PATH, get(ready))
}

async fn ready() -> StatusCode {
    StatusCode::OK
}

/// Parse a listen address; a bare `:port` binds every interface.
pub fn parse_health_address(address: &str) -> Result<SocketAddr> {
    let address = address.trim();
    let full = if address.starts_with(':') {
        format!("0.0.0.0{}", address)
    } else {
        address.to_string()
    };
    full.parse::<SocketAddr>().map_err(|e| {
        ProviderError::transport(format!("invalid health address '{}': {}", address, e))
    })
}

/// Serve the readiness probe on an already bound listener until `shutdown` fires
pub async fn serve_health(listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
    let local = listener.local_addr()?;
    info!(address = %local, "Starting health listener");

    axum::serve(listener, health_router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| ProviderError::transport(format!("health listener error: {}", e)))?;

    info!("Health listener shutdown completed");
    Ok(())
}

/// Bind `address` and serve the readiness probe
pub async fn start_health_server(address: &str, shutdown: CancellationToken) -> Result<()> {
    let addr = parse_health_address(address)?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        ProviderError::transport(format!("failed to bind health listener on {}: {}", addr, e))
    })?;
    serve_health(listener, shutdown).await
}
