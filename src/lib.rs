//! # Akeyless CSI Provider
//!
//! Secrets Store CSI driver provider that delivers Akeyless secrets to pods.
//! The driver calls the provider over a unix socket for every volume mount;
//! the provider authenticates to an Akeyless gateway, fetches the requested
//! items and returns their contents for the driver to write into the pod.
//!
//! ## Architecture
//!
//! ```text
//! Driver gRPC (server) → Provider (provider) → ConfigResolver (config)
//!                                ↓
//!              CredentialManager (auth) → Gateway API (gateway)
//!                                ↓
//!              SecretFetcher + SecretCache (secrets) → MountResponseBuilder
//! ```
//!
//! ## Core Components
//!
//! - **ConfigResolver**: merges request attributes, node-publish secrets,
//!   environment and defaults into one immutable [`config::Config`]
//! - **CredentialManager**: detects a usable access type, authenticates and
//!   keeps the session token fresh in a background loop
//! - **SecretFetcher**: describes each item and retrieves its value by type,
//!   backed by a five minute cache
//! - **MountResponseBuilder**: projects fetched values into files and versions

pub mod auth;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod observability;
pub mod provider;
pub mod secrets;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

/// Code generated from the driver's `v1alpha1` provider contract
pub mod proto {
    pub mod v1alpha1 {
        tonic::include_proto!("v1alpha1");
    }
}

// Re-export commonly used types and traits
pub use config::{Config, ConfigResolver};
pub use errors::{ProviderError, Result};
pub use provider::Provider;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "akeyless-csi-provider");
    }
}
