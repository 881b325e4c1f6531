//! Request and response bodies of the gateway API.

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::config::AccessType;
use crate::secrets::SecretString;

/// Token attached to authenticated calls.
///
/// Universal Identity sessions present their token as `uid-token`; every
/// other access type presents it as `token`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Token(SecretString),
    UidToken(SecretString),
}

impl Credential {
    pub fn for_access_type(access_type: AccessType, token: SecretString) -> Self {
        if access_type.uses_uid_token() {
            Self::UidToken(token)
        } else {
            Self::Token(token)
        }
    }

    pub fn token(&self) -> &SecretString {
        match self {
            Self::Token(token) | Self::UidToken(token) => token,
        }
    }

    fn field(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::UidToken(_) => "uid-token",
        }
    }
}

impl Serialize for Credential {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.field(), self.token().expose_secret())?;
        map.end()
    }
}

fn expose_optional<S: Serializer>(
    value: &Option<SecretString>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(secret) => serializer.serialize_str(secret.expose_secret()),
        None => serializer.serialize_none(),
    }
}

/// Body of `/auth`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthRequest {
    pub access_id: String,
    pub access_type: String,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "expose_optional")]
    pub access_key: Option<SecretString>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "expose_optional")]
    pub cloud_id: Option<SecretString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k8s_auth_config_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "expose_optional")]
    pub k8s_service_account_token: Option<SecretString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_url: Option<String>,
}

impl AuthRequest {
    pub fn new(access_id: impl Into<String>, access_type: AccessType) -> Self {
        Self {
            access_id: access_id.into(),
            access_type: access_type.as_str().to_string(),
            ..Default::default()
        }
    }
}

/// Body returned by `/auth` and `/uid-rotate-token`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub token: String,
}

/// Body of `/uid-rotate-token`
#[derive(Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RotateTokenRequest<'a> {
    pub uid_token: &'a str,
}

/// Body of `/describe-item` and `/get-certificate-value`
#[derive(Debug, Clone, Serialize)]
pub struct NamedItemRequest<'a> {
    pub name: &'a str,
    #[serde(flatten)]
    pub credential: &'a Credential,
}

/// Body of `/get-secret-value`
#[derive(Debug, Clone, Serialize)]
pub struct SecretValueRequest<'a> {
    pub names: Vec<&'a str>,
    #[serde(flatten)]
    pub credential: &'a Credential,
}

/// Body of `/get-rotated-secret-value`
#[derive(Debug, Clone, Serialize)]
pub struct RotatedSecretValueRequest<'a> {
    pub names: &'a str,
    pub json: bool,
    #[serde(flatten)]
    pub credential: &'a Credential,
}

/// Declared type of a gateway item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemType {
    StaticSecret,
    Certificate,
    RotatedSecret,
    Other(String),
}

impl ItemType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "STATIC_SECRET" => Self::StaticSecret,
            "CERTIFICATE" => Self::Certificate,
            "ROTATED_SECRET" => Self::RotatedSecret,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::StaticSecret => "STATIC_SECRET",
            Self::Certificate => "CERTIFICATE",
            Self::RotatedSecret => "ROTATED_SECRET",
            Self::Other(other) => other,
        }
    }
}

/// Item metadata returned by `/describe-item`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ItemDescription {
    #[serde(default)]
    pub item_name: String,
    #[serde(default)]
    pub item_type: String,
    #[serde(default)]
    pub last_version: i64,
}

impl ItemDescription {
    pub fn item_type(&self) -> ItemType {
        ItemType::parse(&self.item_type)
    }
}
