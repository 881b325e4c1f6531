//! Cloud identity documents presented to the gateway's `/auth` endpoint.
//!
//! Each cloud mechanism proves the workload's identity with a document issued
//! by the platform it runs on. [`MetadataCloudIdProvider`] talks to the real
//! metadata services; tests plug in their own [`CloudIdProvider`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub mod aws;

use crate::config::EnvSource;
use crate::config::ProcessEnv;
use crate::secrets::SecretString;
use aws::{AwsCredentials, InstanceRoleCredentials};

/// Audience requested for GCP identity tokens when none is configured
pub const DEFAULT_GCP_AUDIENCE: &str = "akeyless.io";

/// Default location of the projected service account token
pub const DEFAULT_K8S_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Errors raised while obtaining an identity document.
#[derive(Error, Debug)]
pub enum CloudIdError {
    /// The platform metadata service could not be reached or refused the request.
    #[error("{provider} metadata service unavailable: {message}")]
    Metadata { provider: &'static str, message: String },

    /// Required credentials are not present on this host.
    #[error("{provider} credentials not found: {message}")]
    MissingCredentials { provider: &'static str, message: String },

    /// A local identity file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The identity document could not be signed or encoded.
    #[error("failed to build identity document: {0}")]
    Signing(String),
}

impl CloudIdError {
    fn metadata(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Metadata { provider, message: message.into() }
    }
}

/// Source of platform identity documents
#[async_trait]
pub trait CloudIdProvider: Send + Sync {
    /// Base64 envelope of a signed `sts:GetCallerIdentity` request
    async fn aws_cloud_id(&self) -> Result<SecretString, CloudIdError>;

    /// Base64 managed identity access token
    async fn azure_cloud_id(&self, object_id: &str) -> Result<SecretString, CloudIdError>;

    /// Base64 identity token for `audience`
    async fn gcp_cloud_id(&self, audience: &str) -> Result<SecretString, CloudIdError>;

    /// Base64 Kubernetes service account token
    async fn k8s_service_account_token(&self) -> Result<SecretString, CloudIdError>;
}

/// Metadata service locations, overridable for tests
#[derive(Debug, Clone)]
pub struct CloudIdEndpoints {
    pub aws_imds: String,
    pub azure_imds: String,
    pub gcp_metadata: String,
    pub k8s_token_path: PathBuf,
}

impl Default for CloudIdEndpoints {
    fn default() -> Self {
        Self {
            aws_imds: "http://169.254.169.254".to_string(),
            azure_imds: "http://169.254.169.254".to_string(),
            gcp_metadata: "http://metadata.google.internal".to_string(),
            k8s_token_path: PathBuf::from(DEFAULT_K8S_TOKEN_PATH),
        }
    }
}

/// Obtains identity documents from the platform the provider runs on
#[derive(Clone)]
pub struct MetadataCloudIdProvider {
    http: reqwest::Client,
    endpoints: CloudIdEndpoints,
    env: Arc<dyn EnvSource>,
}

impl std::fmt::Debug for MetadataCloudIdProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCloudIdProvider").field("endpoints", &self.endpoints).finish()
    }
}

impl MetadataCloudIdProvider {
    pub fn new(endpoints: CloudIdEndpoints) -> Result<Self, CloudIdError> {
        Self::with_env(endpoints, Arc::new(ProcessEnv))
    }

    pub fn with_env(
        endpoints: CloudIdEndpoints,
        env: Arc<dyn EnvSource>,
    ) -> Result<Self, CloudIdError> {
        // Metadata services answer locally; off-cloud hosts should fail fast
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| CloudIdError::Signing(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, endpoints, env })
    }

    async fn aws_credentials(&self) -> Result<AwsCredentials, CloudIdError> {
        if let (Some(access_key_id), Some(secret)) =
            (self.env.var("AWS_ACCESS_KEY_ID"), self.env.var("AWS_SECRET_ACCESS_KEY"))
        {
            debug!("Using AWS credentials from environment");
            return Ok(AwsCredentials {
                access_key_id,
                secret_access_key: SecretString::new(secret),
                session_token: self.env.var("AWS_SESSION_TOKEN").map(SecretString::new),
            });
        }

        let base = self.endpoints.aws_imds.trim_end_matches('/');
        let session = self
            .http
            .put(format!("{}/latest/api/token", base))
            .header("X-aws-ec2-metadata-token-ttl-seconds", "21600")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CloudIdError::metadata("aws", e.to_string()))?
            .text()
            .await
            .map_err(|e| CloudIdError::metadata("aws", e.to_string()))?;

        let roles_url = format!("{}/latest/meta-data/iam/security-credentials/", base);
        let roles = self.imds_get(&roles_url, &session).await?;
        let role = roles.lines().map(str::trim).find(|line| !line.is_empty()).ok_or_else(|| {
            CloudIdError::MissingCredentials {
                provider: "aws",
                message: "no instance role attached".to_string(),
            }
        })?;

        let body = self.imds_get(&format!("{}{}", roles_url, role), &session).await?;
        let creds: InstanceRoleCredentials = serde_json::from_str(&body)
            .map_err(|e| CloudIdError::metadata("aws", format!("invalid role credentials: {}", e)))?;
        debug!(role = %role, "Using AWS instance role credentials");
        Ok(creds.into())
    }

    async fn imds_get(&self, url: &str, session: &str) -> Result<String, CloudIdError> {
        self.http
            .get(url)
            .header("X-aws-ec2-metadata-token", session)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CloudIdError::metadata("aws", e.to_string()))?
            .text()
            .await
            .map_err(|e| CloudIdError::metadata("aws", e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct AzureTokenResponse {
    access_token: String,
}

#[async_trait]
impl CloudIdProvider for MetadataCloudIdProvider {
    async fn aws_cloud_id(&self) -> Result<SecretString, CloudIdError> {
        let credentials = self.aws_credentials().await?;
        let signed = aws::sign_get_caller_identity(&credentials, chrono::Utc::now())?;
        aws::encode_cloud_id(&signed)
    }

    async fn azure_cloud_id(&self, object_id: &str) -> Result<SecretString, CloudIdError> {
        let url = format!(
            "{}/metadata/identity/oauth2/token",
            self.endpoints.azure_imds.trim_end_matches('/')
        );
        let mut query = vec![
            ("api-version", "2018-02-01"),
            ("resource", "https://management.azure.com/"),
        ];
        if !object_id.is_empty() {
            query.push(("object_id", object_id));
        }

        let response: AzureTokenResponse = self
            .http
            .get(&url)
            .header("Metadata", "true")
            .query(&query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CloudIdError::metadata("azure", e.to_string()))?
            .json()
            .await
            .map_err(|e| CloudIdError::metadata("azure", e.to_string()))?;

        Ok(SecretString::new(STANDARD.encode(response.access_token)))
    }

    async fn gcp_cloud_id(&self, audience: &str) -> Result<SecretString, CloudIdError> {
        let audience = if audience.is_empty() { DEFAULT_GCP_AUDIENCE } else { audience };
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/identity",
            self.endpoints.gcp_metadata.trim_end_matches('/')
        );

        let token = self
            .http
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .query(&[("audience", audience), ("format", "full")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CloudIdError::metadata("gcp", e.to_string()))?
            .text()
            .await
            .map_err(|e| CloudIdError::metadata("gcp", e.to_string()))?;

        Ok(SecretString::new(STANDARD.encode(token.trim())))
    }

    async fn k8s_service_account_token(&self) -> Result<SecretString, CloudIdError> {
        let path = &self.endpoints.k8s_token_path;
        let token = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CloudIdError::Io { path: path.display().to_string(), source })?;
        let token = token.trim();
        if token.is_empty() {
            return Err(CloudIdError::MissingCredentials {
                provider: "k8s",
                message: format!("{} is empty", path.display()),
            });
        }
        Ok(SecretString::new(STANDARD.encode(token)))
    }
}
