//! Merges mount request attributes, node-publish secrets, environment and
//! built-in defaults into a validated [`Config`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use super::env::{EnvSource, ProcessEnv};
use super::settings::{AccessType, Config, Parameters, PodInfo, SecretSpec};
use super::{attributes, env_vars, DEFAULT_GATEWAY_URL, DEFAULT_K8S_MOUNT_PATH};
use crate::errors::{ParseStage, ProviderError, Result};
use crate::gateway::{GatewayApi, GatewayConnector};
use crate::secrets::SecretString;

/// Process-level defaults supplied on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDefaults {
    pub gateway_url: String,
    pub k8s_mount_path: String,
}

impl Default for ProviderDefaults {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            k8s_mount_path: DEFAULT_K8S_MOUNT_PATH.to_string(),
        }
    }
}

/// Builds a [`Config`] for every mount request
#[derive(Clone)]
pub struct ConfigResolver {
    defaults: ProviderDefaults,
    env: Arc<dyn EnvSource>,
}

impl std::fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigResolver").field("defaults", &self.defaults).finish()
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new(ProviderDefaults::default())
    }
}

impl ConfigResolver {
    /// Resolver backed by the process environment
    pub fn new(defaults: ProviderDefaults) -> Self {
        Self { defaults, env: Arc::new(ProcessEnv) }
    }

    /// Resolver backed by an explicit environment source
    pub fn with_env(defaults: ProviderDefaults, env: Arc<dyn EnvSource>) -> Self {
        Self { defaults, env }
    }

    pub fn defaults(&self) -> &ProviderDefaults {
        &self.defaults
    }

    /// Parse, merge and validate the inputs of one mount request.
    ///
    /// `attributes` and `secrets` are the JSON objects carried by the request;
    /// `permission` is the requested file mode. No network call is made.
    #[instrument(skip(self, attributes, secrets), fields(target_path = %target_path))]
    pub fn resolve(
        &self,
        attributes: &str,
        secrets: &str,
        target_path: &str,
        permission: &str,
    ) -> Result<Config> {
        let attrs = parse_string_map(attributes, ParseStage::Attributes)?;
        let payload = parse_string_map(secrets, ParseStage::Secrets)?;

        let parameters = self.merge_parameters(&attrs, &payload)?;
        let file_permission = parse_permission(permission)?;

        let config =
            Config { parameters, target_path: target_path.to_string(), file_permission };
        config.validate()?;

        debug!(
            gateway_url = %config.parameters.gateway_url,
            access_type = ?config.parameters.access_type,
            secrets = config.parameters.secrets.len(),
            pod_name = %config.parameters.pod_info.name,
            pod_namespace = %config.parameters.pod_info.namespace,
            service_account = %config.parameters.pod_info.service_account_name,
            "Resolved mount configuration"
        );

        Ok(config)
    }

    /// Resolve a configuration and hand back a gateway client bound to its URL
    pub fn resolve_with_gateway(
        &self,
        connector: &dyn GatewayConnector,
        attributes: &str,
        secrets: &str,
        target_path: &str,
        permission: &str,
    ) -> Result<(Config, Arc<dyn GatewayApi>)> {
        let config = self.resolve(attributes, secrets, target_path, permission)?;
        let gateway = connector.connect(&config.parameters.gateway_url)?;
        Ok((config, gateway))
    }

    fn merge_parameters(
        &self,
        attrs: &HashMap<String, String>,
        payload: &HashMap<String, String>,
    ) -> Result<Parameters> {
        let lookup = |attribute: &str, env_keys: &[&str]| -> Option<String> {
            non_empty(attrs.get(attribute))
                .or_else(|| non_empty(payload.get(attribute)))
                .or_else(|| self.env.first_of(env_keys))
        };

        let access_type = lookup(attributes::ACCESS_TYPE, &[env_vars::ACCESS_TYPE])
            .map(|value| value.parse::<AccessType>())
            .transpose()?;

        let secrets = parse_objects(attrs.get(attributes::OBJECTS).map(String::as_str))?;

        Ok(Parameters {
            gateway_url: lookup(attributes::GATEWAY_URL, &[env_vars::GATEWAY_URL])
                .unwrap_or_else(|| self.defaults.gateway_url.clone()),
            k8s_mount_path: lookup(attributes::K8S_MOUNT_PATH, &[])
                .unwrap_or_else(|| self.defaults.k8s_mount_path.clone()),
            access_type,
            access_id: lookup(attributes::ACCESS_ID, &[env_vars::ACCESS_ID]).unwrap_or_default(),
            access_key: SecretString::new(
                lookup(attributes::ACCESS_KEY, &[env_vars::ACCESS_KEY, env_vars::CREDENTIALS])
                    .unwrap_or_default(),
            ),
            azure_object_id: lookup(attributes::AZURE_OBJECT_ID, &[env_vars::AZURE_OBJECT_ID])
                .unwrap_or_default(),
            gcp_audience: lookup(attributes::GCP_AUDIENCE, &[env_vars::GCP_AUDIENCE])
                .unwrap_or_default(),
            uid_init_token: SecretString::new(
                lookup(attributes::UID_INIT_TOKEN, &[env_vars::UID_INIT_TOKEN])
                    .unwrap_or_default(),
            ),
            k8s_auth_config_name: lookup(
                attributes::K8S_AUTH_CONFIG_NAME,
                &[env_vars::K8S_AUTH_CONFIG_NAME],
            )
            .unwrap_or_default(),
            secrets,
            pod_info: PodInfo {
                name: attrs.get(attributes::POD_NAME).cloned().unwrap_or_default(),
                uid: attrs.get(attributes::POD_UID).cloned().unwrap_or_default(),
                namespace: attrs.get(attributes::POD_NAMESPACE).cloned().unwrap_or_default(),
                service_account_name: attrs
                    .get(attributes::SERVICE_ACCOUNT_NAME)
                    .cloned()
                    .unwrap_or_default(),
            },
        })
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

fn parse_string_map(raw: &str, stage: ParseStage) -> Result<HashMap<String, String>> {
    if raw.trim().is_empty() {
        return Ok(HashMap::new());
    }
    serde_json::from_str(raw).map_err(|e| ProviderError::parse(stage, e.to_string()))
}

fn parse_objects(raw: Option<&str>) -> Result<Vec<SecretSpec>> {
    let raw = match raw {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(Vec::new()),
    };
    let secrets: Option<Vec<SecretSpec>> = serde_yaml::from_str(raw)
        .map_err(|e| ProviderError::parse(ParseStage::Objects, e.to_string()))?;
    Ok(secrets.unwrap_or_default())
}

/// Parse a requested file mode.
///
/// Accepts decimal (`"420"`) or octal with a `0` / `0o` prefix (`"0644"`).
pub fn parse_permission(raw: &str) -> Result<u32> {
    let trimmed = raw.trim().trim_matches('"');
    let parsed = if let Some(octal) = trimmed.strip_prefix("0o").or_else(|| trimmed.strip_prefix("0O")) {
        u32::from_str_radix(octal, 8)
    } else if trimmed.len() > 1 && trimmed.starts_with('0') {
        u32::from_str_radix(&trimmed[1..], 8)
    } else {
        trimmed.parse::<u32>()
    };

    let mode = parsed.map_err(|e| {
        ProviderError::parse(ParseStage::Permission, format!("'{}': {}", raw, e))
    })?;
    if mode > 0o7777 {
        return Err(ProviderError::parse(
            ParseStage::Permission,
            format!("'{}' is not a valid file mode", raw),
        ));
    }
    Ok(mode)
}
