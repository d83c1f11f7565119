// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Standing watches on upstream repositories and their event trail.

use crate::id::{MessageId, RegistryId, SubscriptionId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on tags requested from upstream per cycle.
pub const MAX_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    /// Display form shown to users, e.g. `docker.io/library/nginx`.
    pub path: String,
    /// Canonical `namespace/repository` used for upstream queries and image names.
    pub raw_path: String,
    /// Tag filter. Empty matches every tag, otherwise a full-match pattern.
    #[serde(default)]
    pub policy: String,
    /// Requested tags per cycle, see [`Subscription::page_size`].
    pub size: u32,
    pub enable: bool,
    #[serde(default)]
    pub fail_times: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notify_ms: Option<u64>,
    /// Target registry created tasks push into.
    pub registry_id: RegistryId,
    /// Agent that executes created tasks.
    pub agent_name: String,
    /// Upstream backend to search. `None` searches all of them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub interval_secs: u64,
    #[serde(default)]
    pub created_at_ms: u64,
    pub resource_version: u64,
}

impl Subscription {
    /// Tags to request this cycle, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn page_size(&self) -> u32 {
        self.size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn repository(&self) -> Result<RepositoryPath, InvalidPath> {
        RepositoryPath::parse(&self.raw_path)
    }
}

crate::builder! {
    pub struct SubscriptionBuilder => Subscription {
        into {
            path: String = "docker.io/library/nginx",
            raw_path: String = "library/nginx",
            policy: String = "",
            agent_name: String = "agent-1",
        }
        set {
            id: SubscriptionId = SubscriptionId::default(),
            size: u32 = 3,
            enable: bool = true,
            fail_times: u32 = 0,
            last_notify_ms: Option<u64> = None,
            registry_id: RegistryId = RegistryId::new(1),
            source: Option<String> = None,
            interval_secs: u64 = 300,
            created_at_ms: u64 = 0,
            resource_version: u64 = 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid repository path {0:?}")]
pub struct InvalidPath(pub String);

/// `namespace/repository` split out of a subscription's raw path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryPath {
    pub namespace: String,
    pub repository: String,
}

impl RepositoryPath {
    /// The repository is the last segment; everything before it is the
    /// namespace. A bare name lives in `library`.
    pub fn parse(raw: &str) -> Result<Self, InvalidPath> {
        let trimmed = raw.trim().trim_matches('/');
        if trimmed.is_empty() || trimmed.contains(':') || trimmed.contains("//") {
            return Err(InvalidPath(raw.to_string()));
        }
        match trimmed.rsplit_once('/') {
            Some((namespace, repository)) => Ok(Self {
                namespace: namespace.to_string(),
                repository: repository.to_string(),
            }),
            None => Ok(Self { namespace: "library".to_string(), repository: trimmed.to_string() }),
        }
    }
}

impl std::fmt::Display for RepositoryPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.repository)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Info,
    Error,
}

crate::simple_display! {
    MessageLevel {
        Info => "info",
        Error => "error",
    }
}

/// Append-only diagnostic event recorded against a Subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMessage {
    pub id: MessageId,
    pub subscription_id: SubscriptionId,
    pub level: MessageLevel,
    pub message: String,
    pub created_at_ms: u64,
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
