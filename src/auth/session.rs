//! The authenticated session shared by mount requests and the refresh loop.

use tokio::sync::RwLock;
use tracing::debug;

use crate::config::AccessType;
use crate::gateway::Credential;
use crate::secrets::SecretString;

/// Opaque bearer token issued by the gateway
pub type AuthToken = SecretString;

/// Current gateway token plus the access type that produced it.
///
/// Request handlers take the read lock to attach the token to outbound calls;
/// the refresh loop takes the write lock only to swap in a new token.
#[derive(Debug)]
pub struct AuthSession {
    access_type: AccessType,
    gateway_url: String,
    token: RwLock<AuthToken>,
    last_error: RwLock<Option<String>>,
}

impl AuthSession {
    pub fn new(access_type: AccessType, gateway_url: impl Into<String>, token: AuthToken) -> Self {
        Self {
            access_type,
            gateway_url: gateway_url.into(),
            token: RwLock::new(token),
            last_error: RwLock::new(None),
        }
    }

    /// Effective access type of the session
    pub fn access_type(&self) -> AccessType {
        self.access_type
    }

    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }

    /// Snapshot of the current token
    pub async fn token(&self) -> AuthToken {
        self.token.read().await.clone()
    }

    /// Current token wrapped for the session's access type
    pub async fn credential(&self) -> Credential {
        Credential::for_access_type(self.access_type, self.token().await)
    }

    /// Swap in a freshly issued token
    pub async fn replace_token(&self, token: AuthToken) {
        *self.token.write().await = token;
        *self.last_error.write().await = None;
        debug!(access_type = %self.access_type, "Session token replaced");
    }

    /// Record a background refresh failure
    pub async fn record_failure(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }

    /// Most recent refresh failure, cleared by the next successful refresh
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }
}
