//! Projection of fetched secrets into the driver's mount response.

use std::collections::HashSet;

use tracing::debug;

use crate::config::{Config, SecretSpec};
use crate::proto::v1alpha1::{File, MountResponse, ObjectVersion};
use crate::secrets::FetchedSecret;

/// Values fetched for one mount request, in request order
#[derive(Debug, Clone, Default)]
pub struct MountSnapshot {
    entries: Vec<(SecretSpec, FetchedSecret)>,
}

impl MountSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, spec: SecretSpec, fetched: FetchedSecret) {
        self.entries.push((spec, fetched));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(SecretSpec, FetchedSecret)> {
        self.entries.iter()
    }
}

/// Builds the [`MountResponse`] of a request
#[derive(Debug, Clone, Copy, Default)]
pub struct MountResponseBuilder;

impl MountResponseBuilder {
    /// One file and one version per distinct `fileName:secretPath`, in
    /// request order. A source path requested under several file names is
    /// delivered under each of them.
    pub fn build(snapshot: &MountSnapshot, config: &Config) -> MountResponse {
        let mode = config.file_permission as i32;
        let mut seen_ids = HashSet::new();
        let mut files = Vec::new();
        let mut object_version = Vec::new();

        for (spec, fetched) in snapshot.iter() {
            let id = spec.version_id();
            if !seen_ids.insert(id.clone()) {
                continue;
            }

            debug!(
                target_path = %config.target_path,
                file = %spec.file_name,
                item = %spec.secret_path,
                "Secret added to mount response"
            );
            files.push(File {
                path: spec.file_name.clone(),
                mode,
                contents: fetched.value.expose_secret().as_bytes().to_vec(),
            });
            object_version.push(ObjectVersion { id, version: fetched.version.clone() });
        }

        MountResponse { object_version, error: None, files }
    }
}
