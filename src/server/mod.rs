//! # Driver gRPC Server
//!
//! Implements the `v1alpha1.CSIDriverProvider` service the Secrets Store CSI
//! driver calls over a unix socket. `Version` is static; `Mount` hands the
//! request to [`Provider::mount`] and reports its failures as gRPC statuses.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use crate::errors::{ProviderError, Result};
use crate::observability::GrpcTracingLayer;
use crate::proto::v1alpha1::csi_driver_provider_server::{
    CsiDriverProvider, CsiDriverProviderServer,
};
use crate::proto::v1alpha1::{MountRequest, MountResponse, VersionRequest, VersionResponse};
use crate::provider::Provider;

/// API version of the driver contract
pub const API_VERSION: &str = "v1alpha1";

/// Version information reported to the driver and by `--version`
pub fn version_response() -> VersionResponse {
    VersionResponse {
        version: API_VERSION.to_string(),
        runtime_name: crate::APP_NAME.to_string(),
        runtime_version: crate::VERSION.to_string(),
    }
}

/// gRPC front of a [`Provider`]
#[derive(Debug, Clone)]
pub struct ProviderService {
    provider: Arc<Provider>,
}

impl ProviderService {
    pub fn new(provider: Arc<Provider>) -> Self {
        Self { provider }
    }
}

#[tonic::async_trait]
impl CsiDriverProvider for ProviderService {
    async fn version(
        &self,
        request: Request<VersionRequest>,
    ) -> std::result::Result<Response<VersionResponse>, Status> {
        debug!(driver_version = %request.get_ref().version, "Version requested");
        Ok(Response::new(version_response()))
    }

    async fn mount(
        &self,
        request: Request<MountRequest>,
    ) -> std::result::Result<Response<MountResponse>, Status> {
        let request = request.into_inner();
        debug!(
            target_path = %request.target_path,
            current_objects = request.current_object_version.len(),
            "Mount requested"
        );

        let response = self
            .provider
            .mount(&request.attributes, &request.secrets, &request.target_path, &request.permission)
            .await
            .map_err(|e| {
                warn!(target_path = %request.target_path, error = %e, "Mount failed");
                Status::from(e)
            })?;
        Ok(Response::new(response))
    }
}

async fn remove_stale_socket(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(endpoint = %path.display(), "Removed stale socket");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ProviderError::io(e, format!("failed to remove stale socket {}", path.display()))),
    }
}

/// Serve the driver contract on `socket_path` until `shutdown` fires.
///
/// A leftover socket file from a previous run is removed before binding and
/// the socket is removed again once the server stops.
pub async fn serve(
    socket_path: impl Into<PathBuf>,
    service: ProviderService,
    shutdown: CancellationToken,
) -> Result<()> {
    let socket_path = socket_path.into();
    remove_stale_socket(&socket_path).await?;

    let listener = UnixListener::bind(&socket_path).map_err(|e| {
        ProviderError::transport(format!("failed to listen on {}: {}", socket_path.display(), e))
    })?;
    info!(endpoint = %socket_path.display(), "Listening for driver connections");

    Server::builder()
        .layer(GrpcTracingLayer::new())
        .add_service(CsiDriverProviderServer::new(service))
        .serve_with_incoming_shutdown(UnixListenerStream::new(listener), async move {
            shutdown.cancelled().await
        })
        .await
        .map_err(|e| ProviderError::transport(format!("gRPC server failed: {}", e)))?;

    remove_stale_socket(&socket_path).await?;
    info!(endpoint = %socket_path.display(), "gRPC server shutdown completed");
    Ok(())
}
