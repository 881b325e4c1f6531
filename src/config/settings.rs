//! # Configuration Settings
//!
//! Defines the resolved configuration of a single mount request.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ParseStage, ProviderError};
use crate::secrets::SecretString;

/// Credential mechanism used to authenticate to the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    /// Access ID + access key
    AccessKey,
    /// AWS IAM cloud identity document
    AwsIam,
    /// Azure AD managed identity token
    AzureAd,
    /// GCP metadata identity token
    Gcp,
    /// Kubernetes service account token
    K8s,
    /// Rotating Universal Identity token
    UniversalIdentity,
}

impl AccessType {
    /// Order in which mechanisms are tried when no access type is pinned
    pub const DETECTION_ORDER: [AccessType; 6] = [
        AccessType::AccessKey,
        AccessType::AwsIam,
        AccessType::AzureAd,
        AccessType::Gcp,
        AccessType::K8s,
        AccessType::UniversalIdentity,
    ];

    /// Wire representation sent as `access-type` to the gateway
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessKey => "access_key",
            Self::AwsIam => "aws_iam",
            Self::AzureAd => "azure_ad",
            Self::Gcp => "gcp",
            Self::K8s => "k8s",
            Self::UniversalIdentity => "universal_identity",
        }
    }

    /// Whether requests carry the token as `uid-token` rather than `token`
    pub fn uses_uid_token(&self) -> bool {
        matches!(self, Self::UniversalIdentity)
    }
}

impl FromStr for AccessType {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "access_key" => Ok(Self::AccessKey),
            "aws_iam" | "aws" => Ok(Self::AwsIam),
            "azure_ad" | "azure" => Ok(Self::AzureAd),
            "gcp" => Ok(Self::Gcp),
            "k8s" | "kubernetes" => Ok(Self::K8s),
            "universal_identity" | "uid" => Ok(Self::UniversalIdentity),
            other => Err(ProviderError::parse(
                ParseStage::AccessType,
                format!("unknown access type '{}'", other),
            )),
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the `objects` document: a remote item delivered as a file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSpec {
    /// File name written inside the target path
    #[serde(default, alias = "objectName")]
    pub file_name: String,

    /// Item name on the gateway
    #[serde(default)]
    pub secret_path: String,

    /// Deprecated type hint. Never used for dispatch; the live item type wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_type: Option<String>,

    /// Opaque arguments carried through unchanged
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secret_args: BTreeMap<String, serde_json::Value>,
}

impl SecretSpec {
    pub fn new(file_name: impl Into<String>, secret_path: impl Into<String>) -> Self {
        Self { file_name: file_name.into(), secret_path: secret_path.into(), ..Default::default() }
    }

    /// Identifier reported in the object version list: `fileName:secretPath`
    pub fn version_id(&self) -> String {
        format!("{}:{}", self.file_name, self.secret_path)
    }
}

/// Pod metadata added to the attributes by the driver. Logged, never used for auth.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PodInfo {
    pub name: String,
    pub uid: String,
    pub namespace: String,
    pub service_account_name: String,
}

/// Parameters merged from attributes, node-publish secrets, environment and defaults
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameters {
    pub gateway_url: String,
    pub k8s_mount_path: String,
    /// Pinned access type; `None` means detect
    pub access_type: Option<AccessType>,
    pub access_id: String,
    pub access_key: SecretString,
    pub azure_object_id: String,
    pub gcp_audience: String,
    pub uid_init_token: SecretString,
    pub k8s_auth_config_name: String,
    pub secrets: Vec<SecretSpec>,
    pub pod_info: PodInfo,
}

/// Resolved configuration of one mount request. Immutable once validated.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub parameters: Parameters,
    pub target_path: String,
    pub file_permission: u32,
}

impl Config {
    /// Validate a merged configuration before any network call is made
    pub fn validate(&self) -> crate::errors::Result<()> {
        if self.target_path.is_empty() {
            return Err(ProviderError::validation("missing target path field"));
        }
        if self.parameters.secrets.is_empty() {
            return Err(ProviderError::validation(
                "no secrets configured - the provider will not read any secret material",
            ));
        }
        if self.parameters.gateway_url.is_empty() {
            return Err(ProviderError::validation("missing gateway URL"));
        }
        for (index, secret) in self.parameters.secrets.iter().enumerate() {
            if secret.secret_path.is_empty() {
                return Err(ProviderError::validation(format!(
                    "objects[{}] is missing 'secretPath'",
                    index
                )));
            }
            if secret.file_name.is_empty() {
                return Err(ProviderError::validation(format!(
                    "objects[{}] ('{}') is missing 'fileName'",
                    index, secret.secret_path
                )));
            }
        }
        Ok(())
    }

    pub fn gateway_url(&self) -> &str {
        &self.parameters.gateway_url
    }

    pub fn access_type(&self) -> Option<AccessType> {
        self.parameters.access_type
    }

    pub fn secrets(&self) -> &[SecretSpec] {
        &self.parameters.secrets
    }
}
