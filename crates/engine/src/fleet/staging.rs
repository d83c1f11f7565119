// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Files rendered locally before they are copied to a host.

use hm_adapters::CredentialRenderer;
use hm_core::Agent;
use hm_wire::{AgentConfig, UpstreamRegistry};
use std::path::{Path, PathBuf};

/// Mount point of the agent's work directory inside its container.
pub(crate) const CONTAINER_WORKDIR: &str = "/hm";

#[derive(Debug, Clone)]
pub struct FleetSettings {
    /// Container image the agent runs in.
    pub image: String,
    /// Per-agent directories are created under this path on each host.
    pub work_root: String,
    /// Local `hm-agent` binary copied to every host.
    pub worker_binary: PathBuf,
    /// Local job template directory copied next to it.
    pub job_template: PathBuf,
    /// Local scratch directory for rendered files.
    pub staging_dir: PathBuf,
    /// Job repository URL; `{agent}` is replaced by the agent name.
    pub job_repository: String,
    pub tunnel_address: String,
    pub rendezvous_url: String,
    pub upstreams: Vec<UpstreamRegistry>,
    pub sync_concurrency: usize,
    /// Owner of uploaded directories on the host.
    pub owner: String,
}

impl FleetSettings {
    pub fn agent_dir(&self, agent: &str) -> String {
        format!("{}/{agent}", self.work_root.trim_end_matches('/'))
    }
}

/// Job repository URL of one agent.
pub fn job_repository(template: &str, agent: &str) -> String {
    template.replace("{agent}", agent)
}

pub(crate) struct RenderedFiles {
    pub config: PathBuf,
    pub origin: PathBuf,
}

/// Write `agent.yaml` and `git-origin` for `agent` under the staging dir.
pub(crate) async fn render<C: CredentialRenderer>(
    settings: &FleetSettings,
    credentials: &C,
    agent: &Agent,
) -> Result<RenderedFiles, super::ReconcileError> {
    let dir = settings.staging_dir.join(&agent.name);
    tokio::fs::create_dir_all(&dir).await?;

    let config = AgentConfig {
        identity: agent.name.clone(),
        tunnel: settings.tunnel_address.clone(),
        rendezvous: settings.rendezvous_url.clone(),
        workdir: CONTAINER_WORKDIR.to_string(),
        concurrency: settings.sync_concurrency,
        poll_interval_secs: 5,
        upstreams: settings.upstreams.clone(),
    };
    let config_path = dir.join("agent.yaml");
    write(&config_path, serde_yaml::to_string(&config)?).await?;

    let repository = job_repository(&settings.job_repository, &agent.name);
    let origin_path = dir.join("git-origin");
    write(&origin_path, credentials.origin_url(&repository, &agent.account)).await?;

    Ok(RenderedFiles { config: config_path, origin: origin_path })
}

async fn write(path: &Path, contents: String) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}
