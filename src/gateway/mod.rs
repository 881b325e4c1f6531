//! # Gateway API
//!
//! The remote secrets-management gateway is reached through the
//! [`GatewayApi`] trait. Production code uses the reqwest-backed
//! [`GatewayClient`]; tests substitute in-memory fakes or a `wiremock` server.
//!
//! All calls are JSON `POST`s relative to the gateway URL:
//!
//! | Operation | Path |
//! |---|---|
//! | authenticate | `/auth` |
//! | rotate UID token | `/uid-rotate-token` |
//! | describe item | `/describe-item` |
//! | static secret value | `/get-secret-value` |
//! | certificate value | `/get-certificate-value` |
//! | rotated secret value | `/get-rotated-secret-value` |

use std::sync::Arc;

use async_trait::async_trait;

pub mod client;
pub mod error;
pub mod types;

pub use client::{GatewayClient, GatewayClientSettings, HttpGatewayConnector};
pub use error::{GatewayError, GatewayResult};
pub use types::{AuthRequest, Credential, ItemDescription, ItemType};

use crate::errors::Result;
use crate::secrets::SecretString;

/// Operations offered by the gateway
#[async_trait]
pub trait GatewayApi: Send + Sync {
    /// Base URL of the gateway, used in error context
    fn url(&self) -> &str;

    /// Exchange a credential payload for a session token
    async fn authenticate(&self, request: &AuthRequest) -> GatewayResult<SecretString>;

    /// Exchange a Universal Identity token for a freshly rotated one
    async fn rotate_uid_token(&self, token: &SecretString) -> GatewayResult<SecretString>;

    /// Fetch the declared type and last version of an item
    async fn describe_item(
        &self,
        name: &str,
        credential: &Credential,
    ) -> GatewayResult<ItemDescription>;

    /// Fetch static secret values keyed by item name
    async fn get_secret_value(
        &self,
        name: &str,
        credential: &Credential,
    ) -> GatewayResult<serde_json::Map<String, serde_json::Value>>;

    /// Fetch the structured value of a certificate item
    async fn get_certificate_value(
        &self,
        name: &str,
        credential: &Credential,
    ) -> GatewayResult<serde_json::Value>;

    /// Fetch a rotated secret as structured JSON
    async fn get_rotated_secret_value(
        &self,
        name: &str,
        credential: &Credential,
    ) -> GatewayResult<serde_json::Map<String, serde_json::Value>>;
}

/// Produces a gateway handle for a resolved gateway URL
pub trait GatewayConnector: Send + Sync {
    fn connect(&self, gateway_url: &str) -> Result<Arc<dyn GatewayApi>>;
}
