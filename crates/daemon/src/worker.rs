// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `hm-agent`: the worker inside each agent container. It holds the tunnel
//! open for search calls and runs the jobs published to its branches.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hm_adapters::{
    DockerImageMover, GitJobSource, HttpRegistryBackend, RegistryError, RendezvousError,
};
use hm_engine::agent::PickupError;
use hm_engine::{run_jobs, CommandResponder, JobPickup, SyncExecutor, TunnelClient, TunnelReporter};
use hm_wire::AgentConfig;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::rendezvous::Rendezvous;

/// Reports buffered while the tunnel is down.
const REPORT_BUFFER: usize = 256;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse { path: PathBuf, source: serde_yaml::Error },
    #[error("upstream {name}: {source}")]
    Upstream { name: String, source: RegistryError },
    #[error("rendezvous: {0}")]
    Rendezvous(#[from] RendezvousError),
    #[error("job ledger: {0}")]
    Pickup(#[from] PickupError),
}

/// Read the YAML config staged next to the worker binary.
pub fn load_agent_config(path: &Path) -> Result<AgentConfig, WorkerError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|source| WorkerError::Read { path: path.to_path_buf(), source })?;
    serde_yaml::from_str(&raw).map_err(|source| WorkerError::Parse { path: path.to_path_buf(), source })
}

fn upstream_backends(config: &AgentConfig) -> Result<Vec<HttpRegistryBackend>, WorkerError> {
    config
        .upstreams
        .iter()
        .map(|u| {
            HttpRegistryBackend::new(&u.name, &u.url, &u.username, &u.password)
                .map_err(|source| WorkerError::Upstream { name: u.name.clone(), source })
        })
        .collect()
}

/// Run the tunnel client and the job loop until `cancel` fires.
pub async fn run_agent(config: AgentConfig, cancel: CancellationToken) -> Result<(), WorkerError> {
    let backends = upstream_backends(&config)?;
    let rendezvous = Rendezvous::open(&config.rendezvous).await?;
    if matches!(rendezvous, Rendezvous::Memory(_)) {
        tracing::warn!("in-process rendezvous: call results will not reach the control plane");
    }

    let (reporter, reports) = TunnelReporter::channel(REPORT_BUFFER);
    let responder = CommandResponder::new(backends, rendezvous);
    let client = TunnelClient::new(&config.identity, &config.tunnel, responder);

    let pickup = JobPickup::open(GitJobSource::new(config.job_checkout()), config.ledger()).await?;
    let executor = SyncExecutor::new(DockerImageMover, reporter, config.concurrency.max(1));
    let interval = Duration::from_secs(config.poll_interval_secs.max(1));

    info!(identity = %config.identity, tunnel = %config.tunnel, "agent started");
    tokio::join!(
        client.run(reports, cancel.clone()),
        run_jobs(pickup, executor, interval, cancel.clone()),
    );
    info!("agent stopped");
    Ok(())
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
