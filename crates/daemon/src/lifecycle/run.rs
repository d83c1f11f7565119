// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemon's long-running loops and their shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hm_adapters::{GitPublisher, JobPublisher, PlainCredentialRenderer, RemoteShell, SshShell};
use hm_core::{HostController, SystemClock};
use hm_engine::{
    FleetReconciler, HostLoop, SubscriptionReconciler, SubscriptionScheduler, SubscriptionService,
    TaskCallbacks, TaskDispatcher, TunnelRegistry, TunnelRouter, TunnelServer,
};
use hm_storage::Store;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{checkpoint, Daemon, LifecycleError};

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// External collaborators the loops drive.
pub struct Services<F, P> {
    /// Remote shell for one host controller.
    pub shell_for: F,
    pub publisher: P,
}

fn ssh_shell(host: &HostController) -> SshShell {
    SshShell::new(&host.address)
}

impl Services<fn(&HostController) -> SshShell, GitPublisher> {
    /// SSH to hosts, git to publish jobs.
    pub fn production() -> Self {
        Self { shell_for: ssh_shell, publisher: GitPublisher::default() }
    }
}

impl Daemon {
    pub async fn run(self, cancel: CancellationToken) -> Result<(), LifecycleError> {
        self.run_with(Services::production(), cancel).await
    }

    /// Run every loop until `cancel` fires, then wait for them and write a
    /// final checkpoint.
    pub async fn run_with<S, F, P>(
        self,
        services: Services<F, P>,
        cancel: CancellationToken,
    ) -> Result<(), LifecycleError>
    where
        S: RemoteShell,
        F: Fn(&HostController) -> S,
        P: JobPublisher,
    {
        let Daemon { config, store, listener, rendezvous, _lock } = self;
        let clock = SystemClock;
        let mut loops = JoinSet::new();

        let registry = TunnelRegistry::new();
        let callbacks = TaskCallbacks::new(store.clone(), clock);
        loops.spawn(TunnelServer::new(listener, registry.clone(), callbacks).run(cancel.clone()));

        let dispatcher = TaskDispatcher::new(
            store.clone(),
            services.publisher,
            PlainCredentialRenderer,
            Arc::new(config.dispatch_settings()),
        );
        let pending = dispatcher.enqueue_pending();
        info!(pending, "task dispatcher ready");
        loops.spawn(dispatcher.run(cancel.clone()));

        let fleet = Arc::new(config.fleet_settings());
        for host in store.list_hosts() {
            let reconciler = FleetReconciler::new(
                store.clone(),
                (services.shell_for)(&host),
                PlainCredentialRenderer,
                clock,
                Arc::clone(&fleet),
            );
            let host_loop =
                HostLoop::new(&host.name, store.clone(), reconciler, clock, config.host_loop_settings());
            loops.spawn(host_loop.run(cancel.clone()));
        }

        let router = TunnelRouter::new(registry, rendezvous, config.call_timeout());
        let reconciler = SubscriptionReconciler::new(
            store.clone(),
            router,
            clock,
            config.subscription.search_agent.clone(),
        );
        let (scheduler, _) =
            SubscriptionScheduler::new(reconciler, store.clone(), clock, config.scheduler_settings());
        loops.spawn(scheduler.run(cancel.clone()));

        loops.spawn(checkpoint_loop(
            store.clone(),
            config.snapshot_path(),
            config.checkpoint_interval(),
            cancel.clone(),
        ));
        loops.spawn(purge_loop(
            SubscriptionService::new(store.clone(), clock),
            config.message_retention(),
            cancel.clone(),
        ));

        info!(hosts = store.list_hosts().len(), "hmd running");
        cancel.cancelled().await;
        info!("shutting down");

        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "loop ended abnormally");
            }
        }
        checkpoint(&store, config.snapshot_path()).await?;
        info!("final checkpoint written");
        Ok(())
    }
}

async fn checkpoint_loop(store: Store, path: PathBuf, every: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                if let Err(e) = checkpoint(&store, path.clone()).await {
                    error!(path = %path.display(), error = %e, "checkpoint failed");
                }
            }
        }
    }
}

async fn purge_loop(
    service: SubscriptionService<SystemClock>,
    retention: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(PURGE_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                let purged = service.purge_messages(retention);
                if purged > 0 {
                    info!(purged, "old subscription messages purged");
                }
            }
        }
    }
}
