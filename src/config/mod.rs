//! # Configuration Management
//!
//! Per-request configuration for mount operations.
//!
//! A mount request carries its configuration as a JSON object of string
//! attributes (the `parameters` block of the SecretProviderClass plus pod
//! metadata added by the driver). [`ConfigResolver`] merges those attributes
//! with the node-publish secrets, process environment and built-in defaults
//! into one immutable [`Config`].
//!
//! Precedence for every tunable field:
//!
//! ```text
//! request attribute > node-publish secret > environment variable > built-in default
//! ```

pub mod env;
pub mod resolver;
pub mod settings;

pub use env::{EnvSource, ProcessEnv};
pub use resolver::{parse_permission, ConfigResolver, ProviderDefaults};
pub use settings::{AccessType, Config, Parameters, PodInfo, SecretSpec};

/// Attribute keys recognised in the mount request.
pub mod attributes {
    pub const GATEWAY_URL: &str = "akeylessGatewayURL";
    pub const K8S_MOUNT_PATH: &str = "vaultKubernetesMountPath";
    pub const ACCESS_TYPE: &str = "akeylessAccessType";
    pub const ACCESS_ID: &str = "akeylessAccessID";
    pub const ACCESS_KEY: &str = "akeylessAccessKey";
    pub const AZURE_OBJECT_ID: &str = "akeylessAzureObjectID";
    pub const GCP_AUDIENCE: &str = "akeylessGCPAudience";
    pub const UID_INIT_TOKEN: &str = "akeylessUIDInitToken";
    pub const K8S_AUTH_CONFIG_NAME: &str = "akeylessK8sAuthConfigName";
    pub const OBJECTS: &str = "objects";

    pub const POD_NAME: &str = "csi.storage.k8s.io/pod.name";
    pub const POD_UID: &str = "csi.storage.k8s.io/pod.uid";
    pub const POD_NAMESPACE: &str = "csi.storage.k8s.io/pod.namespace";
    pub const SERVICE_ACCOUNT_NAME: &str = "csi.storage.k8s.io/serviceAccount.name";
}

/// Environment variables consulted when an attribute is absent.
pub mod env_vars {
    pub const GATEWAY_URL: &str = "AKEYLESS_URL";
    pub const ACCESS_TYPE: &str = "AKEYLESS_ACCESS_TYPE";
    pub const ACCESS_ID: &str = "AKEYLESS_ACCESS_ID";
    pub const ACCESS_KEY: &str = "AKEYLESS_ACCESS_KEY";
    pub const CREDENTIALS: &str = "AKEYLESS_CREDENTIALS";
    pub const AZURE_OBJECT_ID: &str = "AKEYLESS_AZURE_OBJECT_ID";
    pub const GCP_AUDIENCE: &str = "AKEYLESS_GCP_AUDIENCE";
    pub const UID_INIT_TOKEN: &str = "AKEYLESS_UID_INIT_TOKEN";
    pub const K8S_AUTH_CONFIG_NAME: &str = "AKEYLESS_K8S_AUTH_CONF_NAME";
}

/// Built-in gateway URL used when neither the request nor the environment names one
pub const DEFAULT_GATEWAY_URL: &str = "https://api.akeyless.io";

/// Built-in Kubernetes mount path
pub const DEFAULT_K8S_MOUNT_PATH: &str = "kubernetes";
