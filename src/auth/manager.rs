//! Access type detection and session establishment.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::authenticator::{authenticator_for, Authenticator};
use super::cloud_id::CloudIdProvider;
use super::refresh::{spawn_refresh_loop, RefreshHandle, RefreshIntervals};
use super::session::AuthSession;
use crate::config::{AccessType, Config};
use crate::errors::{ProviderError, Result};
use crate::gateway::GatewayApi;

/// A session together with the authenticator that established it
#[derive(Clone)]
pub struct Established {
    pub session: Arc<AuthSession>,
    pub authenticator: Arc<dyn Authenticator>,
}

impl std::fmt::Debug for Established {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Established").field("session", &self.session).finish()
    }
}

/// Establishes and maintains the gateway session
#[derive(Clone)]
pub struct CredentialManager {
    cloud_id: Arc<dyn CloudIdProvider>,
    intervals: RefreshIntervals,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager").field("intervals", &self.intervals).finish()
    }
}

impl CredentialManager {
    pub fn new(cloud_id: Arc<dyn CloudIdProvider>) -> Self {
        Self { cloud_id, intervals: RefreshIntervals::default() }
    }

    pub fn with_intervals(mut self, intervals: RefreshIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    pub fn intervals(&self) -> RefreshIntervals {
        self.intervals
    }

    /// Authenticators to try for `config`, in order
    pub fn candidates(&self, config: &Config) -> Vec<Arc<dyn Authenticator>> {
        match config.access_type() {
            Some(access_type) => vec![authenticator_for(access_type, Arc::clone(&self.cloud_id))],
            None => AccessType::DETECTION_ORDER
                .iter()
                .map(|access_type| authenticator_for(*access_type, Arc::clone(&self.cloud_id)))
                .collect(),
        }
    }

    /// Authenticate with the pinned access type, or detect one.
    ///
    /// A pinned access type is tried alone and its failure is returned as is.
    /// Otherwise mechanisms are tried in detection order and the first success
    /// becomes the session's access type.
    #[instrument(skip(self, config, gateway), fields(gateway_url = %config.gateway_url()))]
    pub async fn authenticate(
        &self,
        config: &Config,
        gateway: &dyn GatewayApi,
    ) -> Result<Established> {
        if let Some(access_type) = config.access_type() {
            let authenticator = authenticator_for(access_type, Arc::clone(&self.cloud_id));
            let token = authenticator.attempt(config, gateway).await?;
            info!(access_type = %access_type, "Authenticated with configured access type");
            return Ok(self.establish(config, authenticator, token));
        }

        info!(access_id = %config.parameters.access_id, "Detecting access type");
        let mut attempts = Vec::new();
        for authenticator in self.candidates(config) {
            let access_type = authenticator.access_type();
            match authenticator.attempt(config, gateway).await {
                Ok(token) => {
                    info!(access_type = %access_type, "Successfully connected using detected access type");
                    return Ok(self.establish(config, authenticator, token));
                }
                Err(e) => {
                    debug!(access_type = %access_type, error = %e, "Access type attempt failed");
                    attempts.push(format!("{}: {}", access_type, e));
                }
            }
        }

        warn!(access_id = %config.parameters.access_id, "No access type succeeded");
        Err(ProviderError::Detection {
            access_id: config.parameters.access_id.clone(),
            gateway_url: config.gateway_url().to_string(),
            attempts,
        })
    }

    fn establish(
        &self,
        config: &Config,
        authenticator: Arc<dyn Authenticator>,
        token: super::AuthToken,
    ) -> Established {
        let session =
            Arc::new(AuthSession::new(authenticator.access_type(), config.gateway_url(), token));
        Established { session, authenticator }
    }

    /// Start the background refresh loop of an established session
    pub fn start_refresh(
        &self,
        established: &Established,
        config: Arc<Config>,
        gateway: Arc<dyn GatewayApi>,
        cancel: CancellationToken,
    ) -> RefreshHandle {
        spawn_refresh_loop(
            Arc::clone(&established.session),
            Arc::clone(&established.authenticator),
            config,
            gateway,
            self.intervals,
            cancel,
        )
    }
}
