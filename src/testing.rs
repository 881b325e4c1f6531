//! In-memory gateway and cloud identity fakes for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::auth::{CloudIdError, CloudIdProvider};
use crate::config::AccessType;
use crate::errors::{self, ProviderError};
use crate::gateway::{
    AuthRequest, Credential, GatewayApi, GatewayConnector, GatewayError, GatewayResult,
    ItemDescription,
};
use crate::secrets::SecretString;

#[derive(Default)]
pub struct FakeGateway {
    accepted: HashMap<String, String>,
    accepted_ids: HashMap<String, String>,
    restricted: HashMap<String, String>,
    auth_delay: Option<Duration>,
    describe_delay: Option<Duration>,
    rotations: Mutex<VecDeque<String>>,
    items: HashMap<String, ItemDescription>,
    values: HashMap<String, Value>,
    auth_requests: Mutex<Vec<AuthRequest>>,
    rotated_from: Mutex<Vec<String>>,
    credentials_seen: Mutex<Vec<Credential>>,
    describe_calls: AtomicUsize,
    value_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue `token` to `/auth` requests for `access_type`
    pub fn accept(mut self, access_type: AccessType, token: &str) -> Self {
        self.accepted.insert(access_type.as_str().to_string(), token.to_string());
        self
    }

    /// Issue `token` to `/auth` requests of `access_id`, whatever the access type
    pub fn accept_id(mut self, access_id: &str, token: &str) -> Self {
        self.accepted_ids.insert(access_id.to_string(), token.to_string());
        self
    }

    /// Allow describing `name` only to callers presenting `token`
    pub fn restrict(mut self, name: &str, token: &str) -> Self {
        self.restricted.insert(name.to_string(), token.to_string());
        self
    }

    /// Hold every `/auth` answer for `delay`
    pub fn auth_delay(mut self, delay: Duration) -> Self {
        self.auth_delay = Some(delay);
        self
    }

    /// Hold every `/describe-item` answer for `delay`
    pub fn describe_delay(mut self, delay: Duration) -> Self {
        self.describe_delay = Some(delay);
        self
    }

    /// Answer successive rotations with `tokens`
    pub fn rotate_to(self, tokens: &[&str]) -> Self {
        if let Ok(mut rotations) = self.rotations.lock() {
            rotations.extend(tokens.iter().map(|t| (*t).to_string()));
        }
        self
    }

    /// Register an item with its type, version and value response
    pub fn item(mut self, name: &str, item_type: &str, version: i64, value: Value) -> Self {
        self.items.insert(
            name.to_string(),
            ItemDescription {
                item_name: name.to_string(),
                item_type: item_type.to_string(),
                last_version: version,
            },
        );
        self.values.insert(name.to_string(), value);
        self
    }

    /// Register a static secret whose value response is `{name: value}`
    pub fn static_secret(self, name: &str, value: &str, version: i64) -> Self {
        let body = serde_json::json!({ name: value });
        self.item(name, "STATIC_SECRET", version, body)
    }

    pub fn auth_requests(&self) -> Vec<AuthRequest> {
        self.auth_requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn rotated_from(&self) -> Vec<String> {
        self.rotated_from.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn credentials_seen(&self) -> Vec<Credential> {
        self.credentials_seen.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    pub fn value_calls(&self) -> usize {
        self.value_calls.load(Ordering::SeqCst)
    }

    fn value(&self, name: &str, credential: &Credential) -> GatewayResult<Value> {
        self.value_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.credentials_seen.lock() {
            seen.push(credential.clone());
        }
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::api(404, &format!(r#"{{"error":"item {} not found"}}"#, name)))
    }

    fn object(&self, name: &str, credential: &Credential) -> GatewayResult<Map<String, Value>> {
        match self.value(name, credential)? {
            Value::Object(map) => Ok(map),
            other => Err(GatewayError::decode(format!("expected object, got {}", other))),
        }
    }
}

#[async_trait]
impl GatewayApi for FakeGateway {
    fn url(&self) -> &str {
        "http://fake-gateway"
    }

    async fn authenticate(&self, request: &AuthRequest) -> GatewayResult<SecretString> {
        if let Ok(mut requests) = self.auth_requests.lock() {
            requests.push(request.clone());
        }
        if let Some(delay) = self.auth_delay {
            tokio::time::sleep(delay).await;
        }
        self.accepted_ids
            .get(&request.access_id)
            .or_else(|| self.accepted.get(&request.access_type))
            .map(|token| SecretString::new(token.clone()))
            .ok_or_else(|| GatewayError::api(401, r#"{"error":"access denied"}"#))
    }

    async fn rotate_uid_token(&self, token: &SecretString) -> GatewayResult<SecretString> {
        if let Ok(mut from) = self.rotated_from.lock() {
            from.push(token.expose_secret().to_string());
        }
        let next = self.rotations.lock().ok().and_then(|mut r| r.pop_front());
        next.map(SecretString::new)
            .ok_or_else(|| GatewayError::api(401, r#"{"error":"invalid uid token"}"#))
    }

    async fn describe_item(
        &self,
        name: &str,
        credential: &Credential,
    ) -> GatewayResult<ItemDescription> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.credentials_seen.lock() {
            seen.push(credential.clone());
        }
        if let Some(delay) = self.describe_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(allowed) = self.restricted.get(name) {
            if credential.token().expose_secret() != allowed {
                return Err(GatewayError::api(403, r#"{"error":"denied"}"#));
            }
        }
        self.items
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::api(404, &format!(r#"{{"error":"item {} not found"}}"#, name)))
    }

    async fn get_secret_value(
        &self,
        name: &str,
        credential: &Credential,
    ) -> GatewayResult<Map<String, Value>> {
        self.object(name, credential)
    }

    async fn get_certificate_value(
        &self,
        name: &str,
        credential: &Credential,
    ) -> GatewayResult<Value> {
        self.value(name, credential)
    }

    async fn get_rotated_secret_value(
        &self,
        name: &str,
        credential: &Credential,
    ) -> GatewayResult<Map<String, Value>> {
        self.object(name, credential)
    }
}

/// Connector handing out the same fake gateway for every URL it was given
pub struct FakeConnector {
    gateway: Arc<FakeGateway>,
    connected: Mutex<Vec<String>>,
}

impl FakeConnector {
    pub fn new(gateway: Arc<FakeGateway>) -> Self {
        Self { gateway, connected: Mutex::new(Vec::new()) }
    }

    pub fn connected(&self) -> Vec<String> {
        self.connected.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl GatewayConnector for FakeConnector {
    fn connect(&self, gateway_url: &str) -> errors::Result<Arc<dyn GatewayApi>> {
        if gateway_url.is_empty() {
            return Err(ProviderError::gateway("connect", gateway_url, "empty gateway URL"));
        }
        if let Ok(mut connected) = self.connected.lock() {
            connected.push(gateway_url.to_string());
        }
        let gateway: Arc<dyn GatewayApi> = self.gateway.clone();
        Ok(gateway)
    }
}

/// Cloud identity source that either serves every document or none
pub struct FakeCloudId {
    available: bool,
}

impl FakeCloudId {
    pub fn all() -> Self {
        Self { available: true }
    }

    pub fn none() -> Self {
        Self { available: false }
    }

    fn document(&self, provider: &'static str) -> std::result::Result<SecretString, CloudIdError> {
        if self.available {
            Ok(SecretString::new(format!("{}-identity-document", provider)))
        } else {
            Err(CloudIdError::Metadata { provider, message: "not running on this platform".into() })
        }
    }
}

#[async_trait]
impl CloudIdProvider for FakeCloudId {
    async fn aws_cloud_id(&self) -> std::result::Result<SecretString, CloudIdError> {
        self.document("aws")
    }

    async fn azure_cloud_id(
        &self,
        _object_id: &str,
    ) -> std::result::Result<SecretString, CloudIdError> {
        self.document("azure")
    }

    async fn gcp_cloud_id(&self, _audience: &str) -> std::result::Result<SecretString, CloudIdError> {
        self.document("gcp")
    }

    async fn k8s_service_account_token(&self) -> std::result::Result<SecretString, CloudIdError> {
        self.document("k8s")
    }
}
