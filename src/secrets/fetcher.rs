//! Item retrieval by declared type.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::cache::{CachedSecret, SecretCache};
use super::types::SecretString;
use crate::auth::AuthSession;
use crate::config::SecretSpec;
use crate::errors::{ProviderError, Result};
use crate::gateway::{Credential, GatewayApi, GatewayError, ItemType};

/// Outcome of fetching one spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSecret {
    pub value: SecretString,
    pub version: String,
    /// Whether the value came from a fresh cache entry
    pub from_cache: bool,
}

/// Retrieves item values through the gateway, consulting the cache first
#[derive(Clone)]
pub struct SecretFetcher {
    gateway: Arc<dyn GatewayApi>,
    session: Arc<AuthSession>,
    cache: SecretCache,
    /// Credential identity the session proves; cache entries are scoped by it
    scope: String,
}

impl std::fmt::Debug for SecretFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretFetcher")
            .field("gateway_url", &self.gateway.url())
            .field("access_type", &self.session.access_type())
            .finish()
    }
}

impl SecretFetcher {
    pub fn new(
        gateway: Arc<dyn GatewayApi>,
        session: Arc<AuthSession>,
        cache: SecretCache,
        scope: impl Into<String>,
    ) -> Self {
        Self { gateway, session, cache, scope: scope.into() }
    }

    /// Fetch the value and version of `spec`.
    ///
    /// A fresh cache entry short-circuits every remote call. Otherwise the
    /// item is described, its value retrieved by declared type and the cache
    /// entry overwritten.
    #[instrument(skip(self, spec), fields(item = %spec.secret_path, file = %spec.file_name))]
    pub async fn fetch(&self, spec: &SecretSpec) -> Result<FetchedSecret> {
        if let Some(cached) = self.cache.get_fresh(&self.scope, &spec.secret_path).await {
            if cached.file_name != spec.file_name {
                debug!(cached_file = %cached.file_name, "Path was first delivered under another file name");
            }
            return Ok(FetchedSecret { value: cached.value, version: cached.version, from_cache: true });
        }

        let credential = self.session.credential().await;
        let item = self
            .gateway
            .describe_item(&spec.secret_path, &credential)
            .await
            .map_err(|e| describe_error(&spec.secret_path, e))?;

        let name = if item.item_name.is_empty() {
            spec.secret_path.as_str()
        } else {
            item.item_name.as_str()
        };
        let item_type = item.item_type();
        let value = match &item_type {
            ItemType::StaticSecret => self.static_secret(name, &credential).await?,
            ItemType::Certificate => self.certificate(name, &credential).await?,
            ItemType::RotatedSecret => self.rotated_secret(name, &credential).await?,
            ItemType::Other(other) => {
                return Err(ProviderError::unsupported_type(other.as_str(), spec.secret_path.as_str()))
            }
        };

        let CachedSecret { value, version, .. } = self
            .cache
            .store(
                &self.scope,
                &spec.secret_path,
                &spec.file_name,
                value,
                item.last_version.to_string(),
            )
            .await;
        info!(item_type = %item_type.as_str(), version = %version, "Fetched secret");
        Ok(FetchedSecret { value, version, from_cache: false })
    }

    fn gateway_error(&self, operation: &str, item: &str, error: GatewayError) -> ProviderError {
        ProviderError::gateway(operation, self.gateway.url(), format!("{}: {}", item, error))
    }

    async fn static_secret(&self, name: &str, credential: &Credential) -> Result<SecretString> {
        let values = self
            .gateway
            .get_secret_value(name, credential)
            .await
            .map_err(|e| self.gateway_error("get-secret-value", name, e))?;

        match values.get(name) {
            Some(serde_json::Value::String(value)) => Ok(SecretString::new(value.clone())),
            Some(other) => Ok(SecretString::new(other.to_string())),
            None => Err(ProviderError::fetch(name, "value missing from gateway response")),
        }
    }

    async fn certificate(&self, name: &str, credential: &Credential) -> Result<SecretString> {
        let value = self
            .gateway
            .get_certificate_value(name, credential)
            .await
            .map_err(|e| self.gateway_error("get-certificate-value", name, e))?;

        serde_json::to_string(&value)
            .map(SecretString::new)
            .map_err(|e| ProviderError::fetch(name, format!("can't serialize certificate value: {}", e)))
    }

    async fn rotated_secret(&self, name: &str, credential: &Credential) -> Result<SecretString> {
        let values = self
            .gateway
            .get_rotated_secret_value(name, credential)
            .await
            .map_err(|e| self.gateway_error("get-rotated-secret-value", name, e))?;

        let value = values
            .get("value")
            .ok_or_else(|| ProviderError::fetch(name, "rotated secret response has no 'value' field"))?;
        serde_json::to_string_pretty(value)
            .map(SecretString::new)
            .map_err(|e| ProviderError::fetch(name, format!("can't serialize rotated value: {}", e)))
    }
}

fn describe_error(item: &str, error: GatewayError) -> ProviderError {
    if error.is_not_found() {
        ProviderError::describe_not_found(item, error.to_string())
    } else {
        ProviderError::describe(item, error.to_string())
    }
}
