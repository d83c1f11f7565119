// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rendering secret material into the artifacts that need it.
//!
//! Everything that embeds a password or token into a file goes through
//! [`CredentialRenderer`], so a secret-store backed renderer can replace the
//! plain one without touching the staging code.

use hm_core::{AccountCredentials, Registry};
use serde::{Deserialize, Serialize};

/// Login for a target registry as written into a job configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryAuth {
    pub server: String,
    pub username: String,
    pub password: String,
}

pub trait CredentialRenderer: Clone + Send + Sync + 'static {
    /// Git remote URL for `repository` that authenticates as `account`.
    fn origin_url(&self, repository: &str, account: &AccountCredentials) -> String;

    fn registry_auth(&self, registry: &Registry) -> RegistryAuth;
}

/// Writes credentials in clear text, as git and docker expect them.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainCredentialRenderer;

impl CredentialRenderer for PlainCredentialRenderer {
    fn origin_url(&self, repository: &str, account: &AccountCredentials) -> String {
        if account.username.is_empty() {
            return repository.to_string();
        }
        let Some((scheme, rest)) = repository.split_once("://") else {
            return repository.to_string();
        };
        // Drop any userinfo already present.
        let rest = rest.split_once('@').map_or(rest, |(_, host)| host);
        format!(
            "{scheme}://{}:{}@{rest}",
            encode_userinfo(&account.username),
            encode_userinfo(&account.token)
        )
    }

    fn registry_auth(&self, registry: &Registry) -> RegistryAuth {
        RegistryAuth {
            server: registry.server.clone(),
            username: registry.username.clone(),
            password: registry.password.clone(),
        }
    }
}

/// Percent-encode the characters that would break URL userinfo.
fn encode_userinfo(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~' => out.push(c),
            other => {
                let mut buf = [0u8; 4];
                for byte in other.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    out
}
