//! Common test utilities for all integration tests.
//!
//! Provides a wiremock-backed gateway and a provider wired to it.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use akeyless_csi_provider::auth::{CloudIdEndpoints, CredentialManager, MetadataCloudIdProvider};
use akeyless_csi_provider::config::{ConfigResolver, ProviderDefaults, DEFAULT_K8S_MOUNT_PATH};
use akeyless_csi_provider::gateway::HttpGatewayConnector;
use akeyless_csi_provider::Provider;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Gateway mock answering the JSON POST API
pub struct TestGateway {
    pub server: MockServer,
}

impl TestGateway {
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Issue `token` to `/auth` calls for `access_type`
    pub async fn accept(&self, access_type: &str, token: &str) {
        Mock::given(method("POST"))
            .and(path("/auth"))
            .and(body_partial_json(json!({ "access-type": access_type })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": token })))
            .mount(&self.server)
            .await;
    }

    /// Reject every `/auth` call no other mock claimed
    pub async fn reject_remaining_auth(&self) {
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "error": "access denied" })),
            )
            .with_priority(10)
            .mount(&self.server)
            .await;
    }

    /// Answer `/uid-rotate-token` for `from` with `to`
    pub async fn rotate(&self, from: &str, to: &str) {
        Mock::given(method("POST"))
            .and(path("/uid-rotate-token"))
            .and(body_partial_json(json!({ "uid-token": from })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": to })))
            .mount(&self.server)
            .await;
    }

    /// Describe `name` as an item of `item_type` at `version`
    pub async fn describe(&self, name: &str, item_type: &str, version: i64) {
        Mock::given(method("POST"))
            .and(path("/describe-item"))
            .and(body_partial_json(json!({ "name": name })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "item_name": name,
                "item_type": item_type,
                "last_version": version,
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn static_secret(&self, name: &str, value: &str, version: i64) {
        self.describe(name, "STATIC_SECRET", version).await;
        Mock::given(method("POST"))
            .and(path("/get-secret-value"))
            .and(body_partial_json(json!({ "names": [name] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ name: value })))
            .mount(&self.server)
            .await;
    }

    pub async fn certificate(&self, name: &str, body: Value, version: i64) {
        self.describe(name, "CERTIFICATE", version).await;
        Mock::given(method("POST"))
            .and(path("/get-certificate-value"))
            .and(body_partial_json(json!({ "name": name })))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    pub async fn rotated_secret(&self, name: &str, value: Value, version: i64) {
        self.describe(name, "ROTATED_SECRET", version).await;
        Mock::given(method("POST"))
            .and(path("/get-rotated-secret-value"))
            .and(body_partial_json(json!({ "names": name, "json": true })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": value })))
            .mount(&self.server)
            .await;
    }

    /// Bodies of every request received on `request_path`
    pub async fn bodies(&self, request_path: &str) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == request_path)
            .filter_map(|r| serde_json::from_slice(&r.body).ok())
            .collect()
    }
}

pub fn env(pairs: &[(&str, &str)]) -> Arc<HashMap<String, String>> {
    Arc::new(pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect())
}

/// Provider whose default gateway and metadata services are the mock server.
///
/// No instance metadata is mocked, so cloud mechanisms fail unless `env`
/// carries AWS credentials.
pub fn provider(gateway: &TestGateway, env: Arc<HashMap<String, String>>) -> Provider {
    let defaults = ProviderDefaults {
        gateway_url: gateway.url(),
        k8s_mount_path: DEFAULT_K8S_MOUNT_PATH.to_string(),
    };
    let endpoints = CloudIdEndpoints {
        aws_imds: gateway.url(),
        azure_imds: gateway.url(),
        gcp_metadata: gateway.url(),
        k8s_token_path: PathBuf::from("/nonexistent/serviceaccount/token"),
    };
    let cloud_id = MetadataCloudIdProvider::with_env(endpoints, env.clone())
        .expect("cloud identity client");

    Provider::new(
        ConfigResolver::with_env(defaults, env),
        Arc::new(HttpGatewayConnector::default()),
        CredentialManager::new(Arc::new(cloud_id)),
    )
}

/// Attributes JSON object of a mount request
pub fn attributes(pairs: &[(&str, &str)]) -> String {
    let map: serde_json::Map<String, Value> =
        pairs.iter().map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string()))).collect();
    Value::Object(map).to_string()
}

pub const BAR1_OBJECTS: &str = "- fileName: bar1\n  secretPath: /foo/bar\n";
