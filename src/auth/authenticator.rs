//! One authentication strategy per access type.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::cloud_id::{CloudIdError, CloudIdProvider};
use super::session::AuthToken;
use crate::config::{AccessType, Config};
use crate::errors::{ProviderError, Result};
use crate::gateway::{AuthRequest, GatewayApi};

/// Proves identity to the gateway with one credential mechanism
#[async_trait]
pub trait Authenticator: Send + Sync {
    fn access_type(&self) -> AccessType;

    /// Obtain a token from scratch
    async fn attempt(&self, config: &Config, gateway: &dyn GatewayApi) -> Result<AuthToken>;

    /// Obtain a replacement for `current`. Re-proves identity unless overridden.
    async fn refresh(
        &self,
        config: &Config,
        gateway: &dyn GatewayApi,
        _current: &AuthToken,
    ) -> Result<AuthToken> {
        self.attempt(config, gateway).await
    }
}

/// Build the authenticator for `access_type`
pub fn authenticator_for(
    access_type: AccessType,
    cloud_id: Arc<dyn CloudIdProvider>,
) -> Arc<dyn Authenticator> {
    match access_type {
        AccessType::AccessKey => Arc::new(AccessKeyAuthenticator),
        AccessType::AwsIam | AccessType::AzureAd | AccessType::Gcp => {
            Arc::new(CloudIdAuthenticator { access_type, cloud_id })
        }
        AccessType::K8s => Arc::new(K8sAuthenticator { cloud_id }),
        AccessType::UniversalIdentity => Arc::new(UniversalIdentityAuthenticator),
    }
}

fn auth_error(access_type: AccessType, config: &Config, message: impl Into<String>) -> ProviderError {
    ProviderError::authentication(access_type.as_str(), config.gateway_url(), message)
}

async fn exchange(
    access_type: AccessType,
    config: &Config,
    gateway: &dyn GatewayApi,
    request: AuthRequest,
) -> Result<AuthToken> {
    let token = gateway
        .authenticate(&request)
        .await
        .map_err(|e| auth_error(access_type, config, e.to_string()))?;
    if token.is_empty() {
        return Err(auth_error(access_type, config, "gateway returned an empty token"));
    }
    debug!(access_type = %access_type, gateway_url = %config.gateway_url(), "Authenticated");
    Ok(token)
}

fn require_access_id(access_type: AccessType, config: &Config) -> Result<()> {
    if config.parameters.access_id.is_empty() {
        return Err(auth_error(access_type, config, "no access ID configured"));
    }
    Ok(())
}

fn cloud_id_error(access_type: AccessType, config: &Config, error: CloudIdError) -> ProviderError {
    auth_error(
        access_type,
        config,
        format!("requested access type {} but failed to get cloud ID: {}", access_type, error),
    )
}

/// Access ID plus access key
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessKeyAuthenticator;

#[async_trait]
impl Authenticator for AccessKeyAuthenticator {
    fn access_type(&self) -> AccessType {
        AccessType::AccessKey
    }

    async fn attempt(&self, config: &Config, gateway: &dyn GatewayApi) -> Result<AuthToken> {
        require_access_id(self.access_type(), config)?;
        if config.parameters.access_key.is_empty() {
            return Err(auth_error(self.access_type(), config, "no access key configured"));
        }

        let mut request = AuthRequest::new(&config.parameters.access_id, self.access_type());
        request.access_key = Some(config.parameters.access_key.clone());
        exchange(self.access_type(), config, gateway, request).await
    }
}

/// AWS IAM, Azure AD or GCP identity document
pub struct CloudIdAuthenticator {
    access_type: AccessType,
    cloud_id: Arc<dyn CloudIdProvider>,
}

#[async_trait]
impl Authenticator for CloudIdAuthenticator {
    fn access_type(&self) -> AccessType {
        self.access_type
    }

    async fn attempt(&self, config: &Config, gateway: &dyn GatewayApi) -> Result<AuthToken> {
        require_access_id(self.access_type, config)?;

        let document = match self.access_type {
            AccessType::AwsIam => self.cloud_id.aws_cloud_id().await,
            AccessType::AzureAd => {
                self.cloud_id.azure_cloud_id(&config.parameters.azure_object_id).await
            }
            _ => self.cloud_id.gcp_cloud_id(&config.parameters.gcp_audience).await,
        }
        .map_err(|e| cloud_id_error(self.access_type, config, e))?;

        let mut request = AuthRequest::new(&config.parameters.access_id, self.access_type);
        request.cloud_id = Some(document);
        exchange(self.access_type, config, gateway, request).await
    }
}

/// Kubernetes service account token checked by a gateway-side auth config
pub struct K8sAuthenticator {
    cloud_id: Arc<dyn CloudIdProvider>,
}

#[async_trait]
impl Authenticator for K8sAuthenticator {
    fn access_type(&self) -> AccessType {
        AccessType::K8s
    }

    async fn attempt(&self, config: &Config, gateway: &dyn GatewayApi) -> Result<AuthToken> {
        require_access_id(AccessType::K8s, config)?;
        if config.parameters.k8s_auth_config_name.is_empty() {
            return Err(auth_error(AccessType::K8s, config, "no K8s auth config name configured"));
        }

        let sa_token = self
            .cloud_id
            .k8s_service_account_token()
            .await
            .map_err(|e| cloud_id_error(AccessType::K8s, config, e))?;

        let mut request = AuthRequest::new(&config.parameters.access_id, AccessType::K8s);
        request.k8s_auth_config_name = Some(config.parameters.k8s_auth_config_name.clone());
        request.k8s_service_account_token = Some(sa_token);
        request.gateway_url = Some(config.gateway_url().to_string());
        exchange(AccessType::K8s, config, gateway, request).await
    }
}

/// Rotating Universal Identity token seeded from the init token
#[derive(Debug, Clone, Copy, Default)]
pub struct UniversalIdentityAuthenticator;

/// Exchange `token` for a rotated one; an empty result is a failure
pub async fn rotate_uid_token(gateway: &dyn GatewayApi, token: &AuthToken) -> Result<AuthToken> {
    info!(gateway_url = %gateway.url(), "Rotating UID token");
    let rotated = gateway
        .rotate_uid_token(token)
        .await
        .map_err(|e| ProviderError::rotation(gateway.url(), e.to_string()))?;
    if rotated.is_empty() {
        return Err(ProviderError::rotation(gateway.url(), "rotated uid token returned empty"));
    }
    info!(gateway_url = %gateway.url(), "Successfully rotated UID token");
    Ok(rotated)
}

#[async_trait]
impl Authenticator for UniversalIdentityAuthenticator {
    fn access_type(&self) -> AccessType {
        AccessType::UniversalIdentity
    }

    async fn attempt(&self, config: &Config, gateway: &dyn GatewayApi) -> Result<AuthToken> {
        if config.parameters.uid_init_token.is_empty() {
            return Err(auth_error(
                AccessType::UniversalIdentity,
                config,
                "no UID init token configured",
            ));
        }
        rotate_uid_token(gateway, &config.parameters.uid_init_token).await
    }

    async fn refresh(
        &self,
        _config: &Config,
        gateway: &dyn GatewayApi,
        current: &AuthToken,
    ) -> Result<AuthToken> {
        rotate_uid_token(gateway, current).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCloudId, FakeGateway};
    use crate::config::{Parameters, SecretSpec};

    fn config(parameters: Parameters) -> Config {
        Config {
            parameters: Parameters {
                gateway_url: "http://gw".to_string(),
                secrets: vec![SecretSpec::new("bar1", "/foo/bar")],
                ..parameters
            },
            target_path: "a".to_string(),
            file_permission: 0o644,
        }
    }

    #[tokio::test]
    async fn test_access_key_sends_key() {
        let gateway = FakeGateway::new().accept(AccessType::AccessKey, "t-ak");
        let cfg = config(Parameters {
            access_id: "p-1".to_string(),
            access_key: "k-1".into(),
            ..Default::default()
        });

        let token = AccessKeyAuthenticator.attempt(&cfg, &gateway).await.unwrap();
        assert_eq!(token.expose_secret(), "t-ak");

        let requests = gateway.auth_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].access_key, Some("k-1".into()));
    }

    #[tokio::test]
    async fn test_access_key_requires_key_without_calling_gateway() {
        let gateway = FakeGateway::new().accept(AccessType::AccessKey, "t-ak");
        let cfg = config(Parameters { access_id: "p-1".to_string(), ..Default::default() });

        let err = AccessKeyAuthenticator.attempt(&cfg, &gateway).await.unwrap_err();
        assert!(matches!(err, ProviderError::Authentication { .. }));
        assert!(gateway.auth_requests().is_empty());
    }

    #[tokio::test]
    async fn test_cloud_id_failure_is_authentication_error() {
        let gateway = FakeGateway::new().accept(AccessType::AwsIam, "t-aws");
        let cfg = config(Parameters { access_id: "p-1".to_string(), ..Default::default() });
        let authenticator = authenticator_for(AccessType::AwsIam, Arc::new(FakeCloudId::none()));

        let err = authenticator.attempt(&cfg, &gateway).await.unwrap_err();
        assert!(err.to_string().contains("failed to get cloud ID"));
    }

    #[tokio::test]
    async fn test_k8s_sends_config_name_and_gateway_url() {
        let gateway = FakeGateway::new().accept(AccessType::K8s, "t-k8s");
        let cfg = config(Parameters {
            access_id: "p-1".to_string(),
            k8s_auth_config_name: "k8s-conf".to_string(),
            ..Default::default()
        });
        let authenticator = authenticator_for(AccessType::K8s, Arc::new(FakeCloudId::all()));

        let token = authenticator.attempt(&cfg, &gateway).await.unwrap();
        assert_eq!(token.expose_secret(), "t-k8s");

        let request = &gateway.auth_requests()[0];
        assert_eq!(request.k8s_auth_config_name.as_deref(), Some("k8s-conf"));
        assert_eq!(request.gateway_url.as_deref(), Some("http://gw"));
        assert!(request.k8s_service_account_token.is_some());
    }

    #[tokio::test]
    async fn test_uid_rotates_init_token() {
        let gateway = FakeGateway::new().rotate_to(&["u-2"]);
        let cfg = config(Parameters { uid_init_token: "u-1".into(), ..Default::default() });

        let token = UniversalIdentityAuthenticator.attempt(&cfg, &gateway).await.unwrap();
        assert_eq!(token.expose_secret(), "u-2");
        assert_eq!(gateway.rotated_from(), vec!["u-1".to_string()]);
    }

    #[tokio::test]
    async fn test_uid_empty_rotation_is_rotation_error() {
        let gateway = FakeGateway::new().rotate_to(&[""]);
        let err = rotate_uid_token(&gateway, &"u-1".into()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Rotation { .. }));
        assert!(err.to_string().contains("returned empty"));
    }
}
