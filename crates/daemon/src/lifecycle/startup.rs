// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup: lock, restore, seed, bind.

use std::io::Write;

use fs2::FileExt;
use hm_core::{AccountCredentials, Agent, AgentStatus, HostController, Registry, RegistryId};
use hm_storage::{Snapshot, Store};
use tokio::net::TcpListener;
use tracing::info;

use super::{Daemon, LifecycleError};
use crate::config::DaemonConfig;
use crate::rendezvous::Rendezvous;

/// Start the daemon. Nothing runs until [`Daemon::run`](super::Daemon).
pub async fn startup(config: DaemonConfig) -> Result<Daemon, LifecycleError> {
    let state_dir = config.state_dir();
    std::fs::create_dir_all(&state_dir)?;

    // Lock before touching state; don't truncate until we hold it.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(config.lock_path())?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    let store = restore(&config)?;
    seed(&store, &config)?;

    let rendezvous = Rendezvous::open(&config.fleet_settings().rendezvous_url).await?;
    info!(backend = rendezvous.backend(), "rendezvous store ready");

    // Bind last, once everything else has validated.
    let listener = TcpListener::bind(&config.tunnel.bind)
        .await
        .map_err(|e| LifecycleError::BindFailed(config.tunnel.bind.clone(), e))?;
    info!(addr = %listener.local_addr()?, "tunnel listener bound");

    Ok(Daemon { config, store, listener, rendezvous, _lock: lock_file })
}

fn restore(config: &DaemonConfig) -> Result<Store, LifecycleError> {
    let path = config.snapshot_path();
    match Snapshot::load(&path)? {
        Some(snapshot) => {
            let tables = snapshot.tables;
            info!(
                path = %path.display(),
                created_at = %snapshot.created_at,
                agents = tables.agents.len(),
                hosts = tables.hosts.len(),
                tasks = tables.tasks.len(),
                subscriptions = tables.subscriptions.len(),
                "state restored from snapshot"
            );
            Ok(Store::from_tables(tables))
        }
        None => {
            info!(path = %path.display(), "no snapshot found, starting with empty state");
            Ok(Store::new())
        }
    }
}

/// Create configured rows that are not in the store yet. Existing rows win.
fn seed(store: &Store, config: &DaemonConfig) -> Result<(), LifecycleError> {
    for host in &config.hosts {
        if store.host_by_name(&host.name).is_none() {
            store.insert_host(HostController::new(&host.name, &host.address))?;
            info!(host = %host.name, "host seeded");
        }
    }

    let registries = store.list_registries();
    for seed in &config.registries {
        if registries.iter().any(|r| r.name == seed.name) {
            continue;
        }
        store.insert_registry(Registry {
            id: RegistryId::default(),
            name: seed.name.clone(),
            server: seed.server.clone(),
            namespace: seed.namespace.clone(),
            username: seed.username.clone(),
            password: seed.password.clone(),
            resource_version: 0,
        })?;
        info!(registry = %seed.name, "registry seeded");
    }

    for seed in &config.agents {
        if store.agent_by_name(&seed.name).is_some() {
            continue;
        }
        let mut agent = Agent::new(&seed.name);
        agent.host = Some(seed.host.clone());
        agent.status = AgentStatus::from(seed.status.as_str());
        agent.account =
            AccountCredentials { username: seed.username.clone(), token: seed.token.clone() };
        store.insert_agent(agent)?;
        info!(agent = %seed.name, host = %seed.host, status = %seed.status, "agent seeded");
    }
    Ok(())
}
