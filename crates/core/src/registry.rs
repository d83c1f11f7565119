// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Target registry that sync jobs push into.

use crate::id::RegistryId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    pub id: RegistryId,
    pub name: String,
    /// Host (and optional port) of the registry, without scheme.
    pub server: String,
    /// Namespace images are pushed under.
    pub namespace: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub resource_version: u64,
}

impl Registry {
    /// Full destination reference for an image, e.g. `server/namespace/repo:tag`.
    ///
    /// Only the last path segment of `image` is kept, so `library/nginx:1.25`
    /// lands at `server/namespace/nginx:1.25`.
    pub fn target_for(&self, image: &str) -> String {
        mirror_reference(&self.server, &self.namespace, image)
    }
}

/// Where `image` lands when mirrored into `server/namespace`.
pub fn mirror_reference(server: &str, namespace: &str, image: &str) -> String {
    let leaf = image.rsplit('/').next().unwrap_or(image);
    if namespace.is_empty() {
        format!("{server}/{leaf}")
    } else {
        format!("{server}/{namespace}/{leaf}")
    }
}

crate::builder! {
    pub struct RegistryBuilder => Registry {
        into {
            name: String = "target",
            server: String = "registry.local:5000",
            namespace: String = "mirror",
            username: String = "admin",
            password: String = "Harbor12345",
        }
        set {
            id: RegistryId = RegistryId::default(),
            resource_version: u64 = 0,
        }
    }
}
