//! # Mount Orchestration
//!
//! [`Provider`] serves mount requests end to end:
//!
//! 1. The request is resolved into a [`Config`] and a gateway handle.
//! 2. The current session is reused when the request carries the same
//!    credential identity and its refresh loop is still running. Otherwise a
//!    new session is authenticated, the previous refresh loop is cancelled and
//!    awaited, and a new loop is started under the provider's lifetime token.
//!    Cached secrets are scoped by that identity, and a change of identity
//!    drops the entries of every other one.
//! 3. Every requested secret is fetched in request order; the first failure
//!    aborts the request.
//! 4. [`MountResponseBuilder`] projects the fetched values into the response.

pub mod response;

use std::sync::Arc;
use std::time::Instant;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::auth::{AuthSession, CredentialManager, Established, RefreshHandle};
use crate::config::{AccessType, Config, ConfigResolver};
use crate::errors::{ProviderError, Result};
use crate::gateway::{GatewayApi, GatewayConnector};
use crate::proto::v1alpha1::MountResponse;
use crate::secrets::{SecretCache, SecretFetcher};

pub use response::{MountResponseBuilder, MountSnapshot};

struct ActiveSession {
    identity: String,
    established: Established,
    gateway: Arc<dyn GatewayApi>,
    refresh: RefreshHandle,
}

/// Serves mount requests against the gateway
pub struct Provider {
    resolver: ConfigResolver,
    connector: Arc<dyn GatewayConnector>,
    credentials: CredentialManager,
    cache: SecretCache,
    active: Mutex<Option<ActiveSession>>,
    lifetime: CancellationToken,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("credentials", &self.credentials)
            .field("cache_ttl", &self.cache.ttl())
            .finish()
    }
}

impl Provider {
    pub fn new(
        resolver: ConfigResolver,
        connector: Arc<dyn GatewayConnector>,
        credentials: CredentialManager,
    ) -> Self {
        Self {
            resolver,
            connector,
            credentials,
            cache: SecretCache::with_default_ttl(),
            active: Mutex::new(None),
            lifetime: CancellationToken::new(),
        }
    }

    pub fn with_cache(mut self, cache: SecretCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &SecretCache {
        &self.cache
    }

    /// Serve one mount request.
    ///
    /// `attributes` and `secrets` are the JSON objects of the request,
    /// `permission` the requested file mode as a string.
    #[instrument(skip(self, attributes, secrets, permission), fields(target_path = %target_path))]
    pub async fn mount(
        &self,
        attributes: &str,
        secrets: &str,
        target_path: &str,
        permission: &str,
    ) -> Result<MountResponse> {
        if self.lifetime.is_cancelled() {
            return Err(ProviderError::transport("provider is shutting down"));
        }
        let started = Instant::now();

        let (config, gateway) = self.resolver.resolve_with_gateway(
            self.connector.as_ref(),
            attributes,
            secrets,
            target_path,
            permission,
        )?;
        let (session, gateway, identity) = self.session_for(&config, gateway).await?;

        let fetcher = SecretFetcher::new(gateway, session, self.cache.clone(), identity);
        let mut snapshot = MountSnapshot::new();
        for spec in config.secrets() {
            match fetcher.fetch(spec).await {
                Ok(fetched) => snapshot.push(spec.clone(), fetched),
                Err(e) => {
                    warn!(item = %spec.secret_path, file = %spec.file_name, error = %e, "Mount aborted");
                    return Err(e);
                }
            }
        }

        let response = MountResponseBuilder::build(&snapshot, &config);
        info!(
            files = response.files.len(),
            versions = response.object_version.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Mount completed"
        );
        Ok(response)
    }

    /// Access type of the current session, if one is established
    pub async fn access_type(&self) -> Option<AccessType> {
        let active = self.active.lock().await;
        active.as_ref().map(|a| a.established.session.access_type())
    }

    /// Last refresh failure recorded on the current session
    pub async fn session_error(&self) -> Option<String> {
        let session = {
            let active = self.active.lock().await;
            active.as_ref().map(|a| Arc::clone(&a.established.session))
        };
        match session {
            Some(session) => session.last_error().await,
            None => None,
        }
    }

    /// Stop serving: cancel the refresh loop and wait for it to exit
    pub async fn shutdown(&self) {
        self.lifetime.cancel();
        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            let exit = previous.refresh.shutdown().await;
            info!(
                access_type = %previous.established.session.access_type(),
                cancelled = exit.is_cancelled(),
                "Refresh loop stopped"
            );
        }
    }

    async fn session_for(
        &self,
        config: &Config,
        gateway: Arc<dyn GatewayApi>,
    ) -> Result<(Arc<AuthSession>, Arc<dyn GatewayApi>, String)> {
        let identity = session_identity(config);
        let mut active = self.active.lock().await;

        let mut identity_changed = true;
        if let Some(current) = active.as_ref() {
            identity_changed = current.identity != identity;
            let refreshing = !current.refresh.is_finished()
                && current.established.session.last_error().await.is_none();
            if !identity_changed && refreshing {
                debug!(access_type = %current.established.session.access_type(), "Reusing session");
                return Ok((
                    Arc::clone(&current.established.session),
                    Arc::clone(&current.gateway),
                    identity,
                ));
            }
        }

        let established = self.credentials.authenticate(config, gateway.as_ref()).await?;

        if let Some(previous) = active.take() {
            let exit = previous.refresh.shutdown().await;
            debug!(cancelled = exit.is_cancelled(), "Replaced previous session");
        }
        if identity_changed {
            self.cache.retain_scope(&identity).await;
        }

        let refresh = self.credentials.start_refresh(
            &established,
            Arc::new(config.clone()),
            Arc::clone(&gateway),
            self.lifetime.child_token(),
        );
        let session = Arc::clone(&established.session);
        *active = Some(ActiveSession {
            identity: identity.clone(),
            established,
            gateway: Arc::clone(&gateway),
            refresh,
        });
        Ok((session, gateway, identity))
    }
}

/// Digest of everything that determines which identity a session proves
fn session_identity(config: &Config) -> String {
    let p = &config.parameters;
    let access_type = p.access_type.map(|t| t.as_str()).unwrap_or_default();
    let mut hasher = Sha256::new();
    for part in [
        p.gateway_url.as_str(),
        p.access_id.as_str(),
        access_type,
        p.access_key.expose_secret(),
        p.uid_init_token.expose_secret(),
        p.azure_object_id.as_str(),
        p.gcp_audience.as_str(),
        p.k8s_auth_config_name.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
