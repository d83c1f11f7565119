// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One reconcile pass for one agent: compare the recorded status with the
//! container on the host and issue the commands that close the gap.

use super::container::{container_name, quote, Container};
use super::staging::{self, FleetSettings, CONTAINER_WORKDIR};
use hm_adapters::{CredentialRenderer, RemoteShell, ShellError};
use hm_core::{Agent, AgentStatus, Clock};
use hm_storage::{Store, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Shell(#[from] ShellError),
    #[error("staging failed: {0}")]
    Staging(#[from] std::io::Error),
    #[error("rendering agent config failed: {0}")]
    Render(#[from] serde_yaml::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Host already matched; nothing was changed.
    Unchanged,
    /// Commands ran and the agent row now carries this state.
    Resolved(Agent),
    /// The agent row was removed.
    Deleted,
    /// The status is not one the reconciler acts on.
    NotHandled,
    /// Someone wrote the agent during the pass. The write triggers a new pass.
    Superseded,
}

/// Reconciles agents placed on one host.
pub struct FleetReconciler<S: RemoteShell, C: CredentialRenderer, K: Clock> {
    store: Store,
    shell: S,
    credentials: C,
    clock: K,
    settings: Arc<FleetSettings>,
}

impl<S: RemoteShell, C: CredentialRenderer, K: Clock> FleetReconciler<S, C, K> {
    pub fn new(store: Store, shell: S, credentials: C, clock: K, settings: Arc<FleetSettings>) -> Self {
        Self { store, shell, credentials, clock, settings }
    }

    pub async fn reconcile(&self, agent: &Agent) -> Result<Outcome, ReconcileError> {
        match &agent.status {
            AgentStatus::Starting => {
                match self.container(agent).await? {
                    Some(_) => self.docker(&format!("start {}", quote(&container_name(&agent.name)))).await?,
                    None => self.launch(agent).await?,
                }
                self.transition(agent, AgentStatus::Running, "started")
            }
            AgentStatus::Restarting => {
                match self.container(agent).await? {
                    Some(_) => self.docker(&format!("restart {}", quote(&container_name(&agent.name)))).await?,
                    None => self.launch(agent).await?,
                }
                self.transition(agent, AgentStatus::Running, "restarted")
            }
            AgentStatus::Stopping => {
                if self.container(agent).await?.is_some() {
                    self.docker(&format!("stop {}", quote(&container_name(&agent.name)))).await?;
                }
                self.transition(agent, AgentStatus::Stopped, "stopped")
            }
            AgentStatus::Upgrading => {
                self.remove_container(agent).await?;
                let checkout = format!("{}/jobs", self.settings.agent_dir(&agent.name));
                self.run(&format!("rm -rf {}", quote(&checkout))).await?;
                self.launch(agent).await?;
                self.transition(agent, AgentStatus::Running, "upgraded")
            }
            AgentStatus::Running => match self.container(agent).await? {
                Some(container) if container.is_running() => Ok(Outcome::Unchanged),
                found => {
                    info!(agent = %agent.name, container = ?found.map(|c| c.state), "container not serving, recreating");
                    self.remove_container(agent).await?;
                    self.launch(agent).await?;
                    self.transition(agent, AgentStatus::Running, "container recreated")
                }
            },
            AgentStatus::Offline => {
                self.remove_container(agent).await?;
                self.reclaim_workdir(agent).await?;
                self.transition(agent, AgentStatus::Stopped, "taken offline, work directory reclaimed")
            }
            AgentStatus::Deleting => {
                self.remove_container(agent).await?;
                self.reclaim_workdir(agent).await?;
                match self.store.delete_agent(agent.id) {
                    Ok(_) | Err(StoreError::NotFound { .. }) => {}
                    Err(e) => return Err(e.into()),
                }
                info!(agent = %agent.name, "agent deleted");
                Ok(Outcome::Deleted)
            }
            AgentStatus::NotStarted
            | AgentStatus::Stopped
            | AgentStatus::Error
            | AgentStatus::Unrecognized(_) => Ok(Outcome::NotHandled),
        }
    }

    async fn container(&self, agent: &Agent) -> Result<Option<Container>, ReconcileError> {
        let name = container_name(&agent.name);
        let query = Container::query(&name);
        let output = self.shell.run(&query).await?.check(&query)?;
        Ok(Container::parse(&output.stdout, &name))
    }

    /// Stage the work directory and start a fresh container.
    async fn launch(&self, agent: &Agent) -> Result<(), ReconcileError> {
        self.stage(agent).await?;
        let dir = self.settings.agent_dir(&agent.name);
        let config = format!("{CONTAINER_WORKDIR}/agent.yaml");
        let binary = format!("{CONTAINER_WORKDIR}/hm-agent");
        self.docker(&format!(
            "run -d --name {} --restart unless-stopped --network host -v {}:{CONTAINER_WORKDIR} {} {} --config {}",
            quote(&container_name(&agent.name)),
            quote(&dir),
            quote(&self.settings.image),
            quote(&binary),
            quote(&config),
        ))
        .await?;
        info!(agent = %agent.name, image = %self.settings.image, "agent container launched");
        Ok(())
    }

    /// Copy config, binary, template and git origin to the host, and make
    /// sure the job checkout points at the agent's repository.
    async fn stage(&self, agent: &Agent) -> Result<(), ReconcileError> {
        let files = staging::render(&self.settings, &self.credentials, agent).await?;
        let dir = self.settings.agent_dir(&agent.name);
        let checkout = format!("{dir}/jobs");
        let origin = format!("{dir}/git-origin");

        self.run(&format!("mkdir -p {}", quote(&format!("{dir}/state")))).await?;
        self.shell.upload_file(&files.config, &format!("{dir}/agent.yaml"), 0o600).await?;
        self.shell.upload_file(&self.settings.worker_binary, &format!("{dir}/hm-agent"), 0o755).await?;
        self.shell
            .upload_directory(&self.settings.job_template, &format!("{dir}/template"), &self.settings.owner)
            .await?;
        self.shell.upload_file(&files.origin, &origin, 0o600).await?;
        self.shell
            .run_batch(&[
                format!("test -d {0}/.git || git init -q {0}", quote(&checkout)),
                format!(
                    "git -C {0} remote remove origin >/dev/null 2>&1; git -C {0} remote add origin \"$(cat {1})\"",
                    quote(&checkout),
                    quote(&origin)
                ),
            ])
            .await?;
        debug!(agent = %agent.name, dir, "work directory staged");
        Ok(())
    }

    async fn remove_container(&self, agent: &Agent) -> Result<(), ReconcileError> {
        let command = format!("docker rm -f {}", quote(&container_name(&agent.name)));
        let output = self.shell.run(&command).await?;
        if output.success() || output.stderr.contains("No such container") {
            return Ok(());
        }
        output.check(&command)?;
        Ok(())
    }

    async fn reclaim_workdir(&self, agent: &Agent) -> Result<(), ReconcileError> {
        self.run(&format!("rm -rf {}", quote(&self.settings.agent_dir(&agent.name)))).await
    }

    async fn docker(&self, args: &str) -> Result<(), ReconcileError> {
        self.run(&format!("docker {args}")).await
    }

    async fn run(&self, command: &str) -> Result<(), ReconcileError> {
        self.shell.run(command).await?.check(command)?;
        Ok(())
    }

    /// Record the state the host now matches.
    fn transition(&self, agent: &Agent, status: AgentStatus, message: &str) -> Result<Outcome, ReconcileError> {
        let now = self.clock.epoch_ms();
        let result = self.store.update_agent(agent.id, agent.resource_version, |a| {
            a.status = status;
            a.message = message.to_string();
            a.last_transition_ms = now;
        });
        match result {
            Ok(updated) => {
                info!(agent = %updated.name, from = %agent.status, to = %updated.status, "agent reconciled");
                Ok(Outcome::Resolved(updated))
            }
            Err(e) if e.is_conflict() => {
                debug!(agent = %agent.name, "agent changed during reconcile");
                Ok(Outcome::Superseded)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod tests;
