//! reqwest-backed gateway client.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, trace};
use url::Url;

use super::error::{GatewayError, GatewayResult};
use super::types::{
    AuthRequest, Credential, ItemDescription, NamedItemRequest, RotateTokenRequest,
    RotatedSecretValueRequest, SecretValueRequest, TokenResponse,
};
use super::{GatewayApi, GatewayConnector};
use crate::errors::{ProviderError, Result};
use crate::secrets::SecretString;

/// HTTP settings shared by every gateway client
#[derive(Debug, Clone)]
pub struct GatewayClientSettings {
    /// Whole-request timeout
    pub timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// TCP keepalive interval
    pub tcp_keepalive: Duration,
    /// Idle connections kept per gateway host
    pub pool_max_idle_per_host: usize,
    pub user_agent: String,
}

impl Default for GatewayClientSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(55),
            connect_timeout: Duration::from_secs(55),
            tcp_keepalive: Duration::from_secs(55),
            pool_max_idle_per_host: 100,
            user_agent: format!("{}/{}", crate::APP_NAME, crate::VERSION),
        }
    }
}

/// Gateway API client over HTTP JSON
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
}

impl GatewayClient {
    /// Create a client for the gateway at `base_url`
    pub fn new(base_url: &str, settings: &GatewayClientSettings) -> GatewayResult<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| GatewayError::configuration(format!("'{}': {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(GatewayError::configuration(format!(
                "'{}': unsupported scheme '{}'",
                base_url,
                parsed.scheme()
            )));
        }

        let client = Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .tcp_keepalive(settings.tcp_keepalive)
            .pool_max_idle_per_host(settings.pool_max_idle_per_host)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| GatewayError::configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Send a POST request with JSON body and deserialize the response
    async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> GatewayResult<R> {
        let url = self.endpoint(path);
        debug!(url = %url, "POST");

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        debug!(url = %url, status = status.as_u16(), "Gateway response");

        let text = response.text().await?;
        if !status.is_success() {
            trace!(url = %url, body = %text, "Gateway error response");
            return Err(GatewayError::api(status.as_u16(), &text));
        }

        serde_json::from_str(&text).map_err(|e| GatewayError::decode(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl GatewayApi for GatewayClient {
    fn url(&self) -> &str {
        &self.base_url
    }

    async fn authenticate(&self, request: &AuthRequest) -> GatewayResult<SecretString> {
        let response: TokenResponse = self.post_json("auth", request).await?;
        Ok(SecretString::new(response.token))
    }

    async fn rotate_uid_token(&self, token: &SecretString) -> GatewayResult<SecretString> {
        let body = RotateTokenRequest { uid_token: token.expose_secret() };
        let response: TokenResponse = self.post_json("uid-rotate-token", &body).await?;
        Ok(SecretString::new(response.token))
    }

    async fn describe_item(
        &self,
        name: &str,
        credential: &Credential,
    ) -> GatewayResult<ItemDescription> {
        self.post_json("describe-item", &NamedItemRequest { name, credential }).await
    }

    async fn get_secret_value(
        &self,
        name: &str,
        credential: &Credential,
    ) -> GatewayResult<serde_json::Map<String, serde_json::Value>> {
        self.post_json("get-secret-value", &SecretValueRequest { names: vec![name], credential })
            .await
    }

    async fn get_certificate_value(
        &self,
        name: &str,
        credential: &Credential,
    ) -> GatewayResult<serde_json::Value> {
        self.post_json("get-certificate-value", &NamedItemRequest { name, credential }).await
    }

    async fn get_rotated_secret_value(
        &self,
        name: &str,
        credential: &Credential,
    ) -> GatewayResult<serde_json::Map<String, serde_json::Value>> {
        let body = RotatedSecretValueRequest { names: name, json: true, credential };
        self.post_json("get-rotated-secret-value", &body).await
    }
}

/// Builds [`GatewayClient`]s with shared HTTP settings.
///
/// One client (and its connection pool) is kept per gateway URL and handed out
/// to every request naming that gateway.
#[derive(Debug, Clone, Default)]
pub struct HttpGatewayConnector {
    settings: GatewayClientSettings,
    clients: Arc<Mutex<HashMap<String, Arc<GatewayClient>>>>,
}

impl HttpGatewayConnector {
    pub fn new(settings: GatewayClientSettings) -> Self {
        Self { settings, clients: Arc::default() }
    }
}

impl GatewayConnector for HttpGatewayConnector {
    fn connect(&self, gateway_url: &str) -> Result<Arc<dyn GatewayApi>> {
        let key = gateway_url.trim_end_matches('/');
        let mut clients = self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(client) = clients.get(key) {
            let client: Arc<dyn GatewayApi> = client.clone();
            return Ok(client);
        }

        let client = GatewayClient::new(gateway_url, &self.settings)
            .map_err(|e| ProviderError::gateway("connect", gateway_url, e.to_string()))?;
        debug!(gateway = %key, "Created gateway client");
        let client = Arc::new(client);
        clients.insert(key.to_string(), client.clone());
        Ok(client)
    }
}
