// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration a host controller stages next to each agent's worker binary.

use serde::{Deserialize, Serialize};

/// Upstream registry an agent searches for tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamRegistry {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Name the agent registers with on the tunnel.
    pub identity: String,
    /// `host:port` of the control plane's tunnel listener.
    pub tunnel: String,
    /// Rendezvous store URL; `memory` only works in-process.
    pub rendezvous: String,
    /// Root of the agent's working directory inside the container.
    #[serde(default = "default_workdir")]
    pub workdir: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub upstreams: Vec<UpstreamRegistry>,
}

fn default_workdir() -> String {
    "/hm".to_string()
}

fn default_concurrency() -> usize {
    2
}

fn default_poll_interval() -> u64 {
    5
}

impl AgentConfig {
    /// Checkout the agent fetches job branches into.
    pub fn job_checkout(&self) -> String {
        format!("{}/jobs", self.workdir)
    }

    /// File recording which tasks already ran.
    pub fn ledger(&self) -> String {
        format!("{}/state/executed.json", self.workdir)
    }
}
