//! AWS IAM cloud identity document.
//!
//! The gateway verifies AWS identity by replaying a pre-signed
//! `sts:GetCallerIdentity` request. We sign that request with SigV4 and hand
//! over its method, URL, body and headers as a base64 JSON envelope.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::CloudIdError;
use crate::secrets::SecretString;

type HmacSha256 = Hmac<Sha256>;

pub const STS_URL: &str = "https://sts.amazonaws.com/";
const STS_HOST: &str = "sts.amazonaws.com";
const STS_REGION: &str = "us-east-1";
const STS_SERVICE: &str = "sts";
const STS_BODY: &str = "Action=GetCallerIdentity&Version=2011-06-15";
const CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Credentials used to sign the STS request
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
    pub session_token: Option<SecretString>,
}

/// Role credentials as served by the instance metadata service
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct InstanceRoleCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl From<InstanceRoleCredentials> for AwsCredentials {
    fn from(creds: InstanceRoleCredentials) -> Self {
        Self {
            access_key_id: creds.access_key_id,
            secret_access_key: SecretString::new(creds.secret_access_key),
            session_token: creds.token.filter(|t| !t.is_empty()).map(SecretString::new),
        }
    }
}

/// A signed `GetCallerIdentity` request
#[derive(Debug, Clone, PartialEq)]
pub struct SignedStsRequest {
    pub method: &'static str,
    pub url: &'static str,
    pub body: &'static str,
    pub headers: BTreeMap<String, Vec<String>>,
}

fn hmac_sha256(key: &[u8], data: &str) -> Result<Vec<u8>, CloudIdError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CloudIdError::Signing(format!("invalid HMAC key: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Sign `sts:GetCallerIdentity` with SigV4 at the given instant
pub fn sign_get_caller_identity(
    credentials: &AwsCredentials,
    now: DateTime<Utc>,
) -> Result<SignedStsRequest, CloudIdError> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();
    let payload_hash = hex::encode(Sha256::digest(STS_BODY.as_bytes()));

    // Lowercase names, sorted
    let mut canonical: Vec<(&str, &str)> =
        vec![("content-type", CONTENT_TYPE), ("host", STS_HOST), ("x-amz-date", amz_date.as_str())];
    if let Some(token) = &credentials.session_token {
        canonical.push(("x-amz-security-token", token.expose_secret()));
    }

    let canonical_headers: String =
        canonical.iter().map(|(name, value)| format!("{}:{}\n", name, value)).collect();
    let signed_headers =
        canonical.iter().map(|(name, _)| *name).collect::<Vec<_>>().join(";");

    let canonical_request =
        format!("POST\n/\n\n{}\n{}\n{}", canonical_headers, signed_headers, payload_hash);
    let scope = format!("{}/{}/{}/aws4_request", date_stamp, STS_REGION, STS_SERVICE);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let secret = format!("AWS4{}", credentials.secret_access_key.expose_secret());
    let k_date = hmac_sha256(secret.as_bytes(), &date_stamp)?;
    let k_region = hmac_sha256(&k_date, STS_REGION)?;
    let k_service = hmac_sha256(&k_region, STS_SERVICE)?;
    let k_signing = hmac_sha256(&k_service, "aws4_request")?;
    let signature = hex::encode(hmac_sha256(&k_signing, &string_to_sign)?);

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        credentials.access_key_id, scope, signed_headers, signature
    );

    let mut headers = BTreeMap::new();
    headers.insert("Authorization".to_string(), vec![authorization]);
    headers.insert("Content-Type".to_string(), vec![CONTENT_TYPE.to_string()]);
    headers.insert("Host".to_string(), vec![STS_HOST.to_string()]);
    headers.insert("X-Amz-Date".to_string(), vec![amz_date]);
    if let Some(token) = &credentials.session_token {
        headers.insert(
            "X-Amz-Security-Token".to_string(),
            vec![token.expose_secret().to_string()],
        );
    }

    Ok(SignedStsRequest { method: "POST", url: STS_URL, body: STS_BODY, headers })
}

/// Encode a signed request as the cloud-id the gateway expects
pub fn encode_cloud_id(request: &SignedStsRequest) -> Result<SecretString, CloudIdError> {
    let headers = serde_json::to_string(&request.headers)
        .map_err(|e| CloudIdError::Signing(format!("failed to encode headers: {}", e)))?;

    let mut envelope = BTreeMap::new();
    envelope.insert("sts_request_method", STANDARD.encode(request.method));
    envelope.insert("sts_request_url", STANDARD.encode(request.url));
    envelope.insert("sts_request_body", STANDARD.encode(request.body));
    envelope.insert("sts_request_headers", STANDARD.encode(headers));

    let json = serde_json::to_string(&envelope)
        .map_err(|e| CloudIdError::Signing(format!("failed to encode envelope: {}", e)))?;
    Ok(SecretString::new(STANDARD.encode(json)))
}
