// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-host control loop.
//!
//! Watches store changes for agents on one host and runs their reconcile
//! passes. Each agent gets a serial worker fed by a one-slot channel, so a
//! burst of writes collapses into at most one queued pass.

use super::reconciler::{FleetReconciler, Outcome, ReconcileError};
use hm_adapters::{CredentialRenderer, RemoteShell};
use hm_core::{Agent, AgentStatus, Clock};
use hm_storage::{Change, Store};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct HostLoopSettings {
    /// Every agent on the host is re-triggered this often.
    pub resync_interval: Duration,
    /// Consecutive failed passes before the agent is marked `Error`.
    pub max_failures: u32,
    /// Delay before retrying a failed pass, multiplied by the failure count.
    pub retry_delay: Duration,
}

impl Default for HostLoopSettings {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(60),
            max_failures: 5,
            retry_delay: Duration::from_secs(2),
        }
    }
}

pub struct HostLoop<S: RemoteShell, C: CredentialRenderer, K: Clock> {
    host: String,
    store: Store,
    changes: broadcast::Receiver<Change>,
    reconciler: Arc<FleetReconciler<S, C, K>>,
    clock: K,
    settings: HostLoopSettings,
}

impl<S: RemoteShell, C: CredentialRenderer, K: Clock> HostLoop<S, C, K> {
    pub fn new(
        host: impl Into<String>,
        store: Store,
        reconciler: FleetReconciler<S, C, K>,
        clock: K,
        settings: HostLoopSettings,
    ) -> Self {
        // Subscribe now so writes made before `run` is polled are not missed.
        let changes = store.subscribe();
        Self { host: host.into(), store, changes, reconciler: Arc::new(reconciler), clock, settings }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut workers = HashMap::new();
        info!(host = %self.host, "host loop started");
        self.resync(&mut workers, &cancel);

        let mut resync = tokio::time::interval(self.settings.resync_interval);
        resync.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = resync.tick() => self.resync(&mut workers, &cancel),
                change = self.changes.recv() => match change {
                    Ok(Change::Agent { name, host } | Change::AgentDeleted { name, host })
                        if host.as_deref() == Some(self.host.as_str()) =>
                    {
                        self.trigger(&mut workers, &name, &cancel);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        warn!(host = %self.host, missed, "change feed lagged, resyncing");
                        self.resync(&mut workers, &cancel);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        info!(host = %self.host, "host loop stopped");
    }

    fn resync(&self, workers: &mut HashMap<String, mpsc::Sender<()>>, cancel: &CancellationToken) {
        for agent in self.store.agents_on_host(&self.host) {
            self.trigger(workers, &agent.name, cancel);
        }
    }

    /// Queue a pass for `name`, starting its worker if needed.
    fn trigger(
        &self,
        workers: &mut HashMap<String, mpsc::Sender<()>>,
        name: &str,
        cancel: &CancellationToken,
    ) {
        if let Some(tx) = workers.get(name) {
            match tx.try_send(()) {
                Ok(()) | Err(TrySendError::Full(())) => return,
                Err(TrySendError::Closed(())) => {
                    workers.remove(name);
                }
            }
        }
        if self.store.agent_by_name(name).is_none() {
            return;
        }

        let (tx, rx) = mpsc::channel(1);
        let _ = tx.try_send(());
        let worker = AgentWorker {
            name: name.to_string(),
            host: self.host.clone(),
            store: self.store.clone(),
            reconciler: Arc::clone(&self.reconciler),
            clock: self.clock.clone(),
            settings: self.settings.clone(),
        };
        tokio::spawn(worker.run(rx, cancel.clone()));
        workers.insert(name.to_string(), tx);
    }
}

struct AgentWorker<S: RemoteShell, C: CredentialRenderer, K: Clock> {
    name: String,
    host: String,
    store: Store,
    reconciler: Arc<FleetReconciler<S, C, K>>,
    clock: K,
    settings: HostLoopSettings,
}

impl<S: RemoteShell, C: CredentialRenderer, K: Clock> AgentWorker<S, C, K> {
    async fn run(self, mut triggers: mpsc::Receiver<()>, cancel: CancellationToken) {
        let mut failures = 0u32;
        loop {
            let retry = (failures > 0).then(|| {
                (self.settings.retry_delay * failures).min(self.settings.resync_interval)
            });
            tokio::select! {
                _ = cancel.cancelled() => return,
                trigger = triggers.recv() => if trigger.is_none() { return },
                _ = tokio::time::sleep(retry.unwrap_or_default()), if retry.is_some() => {}
            }

            // Gone or moved to another host: stop and let the map respawn us.
            let Some(agent) = self.store.agent_by_name(&self.name) else { return };
            if agent.host.as_deref() != Some(self.host.as_str()) {
                return;
            }

            match self.reconciler.reconcile(&agent).await {
                Ok(Outcome::Deleted) => return,
                Ok(outcome) => {
                    failures = 0;
                    debug!(agent = %self.name, ?outcome, "reconcile pass done");
                }
                Err(e) => {
                    failures += 1;
                    warn!(agent = %self.name, failures, error = %e, "reconcile pass failed");
                    if failures >= self.settings.max_failures {
                        self.mark_error(&agent, &e, failures);
                        failures = 0;
                    }
                }
            }
        }
    }

    fn mark_error(&self, agent: &Agent, e: &ReconcileError, failures: u32) {
        let now = self.clock.epoch_ms();
        let message = format!("reconcile failed {failures} times: {e}");
        match self.store.update_agent(agent.id, agent.resource_version, |a| {
            a.status = AgentStatus::Error;
            a.message = message;
            a.last_transition_ms = now;
        }) {
            Ok(_) => error!(agent = %self.name, failures, "agent marked Error"),
            Err(e) if e.is_conflict() => debug!(agent = %self.name, "agent changed, not marking Error"),
            Err(e) => warn!(agent = %self.name, error = %e, "failed to mark agent Error"),
        }
    }
}

#[cfg(test)]
#[path = "host_loop_tests.rs"]
mod tests;
