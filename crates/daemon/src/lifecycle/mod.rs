// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup, the long-running loops, shutdown.

mod checkpoint;
mod run;
mod startup;

pub use checkpoint::checkpoint;
pub use run::Services;
pub use startup::startup;

use crate::config::DaemonConfig;
use crate::rendezvous::Rendezvous;
use hm_adapters::RendezvousError;
use hm_storage::{SnapshotError, Store, StoreError};
use std::fs::File;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("another hmd holds the lock: {0}")]
    LockFailed(std::io::Error),
    #[error("failed to bind tunnel listener on {0}: {1}")]
    BindFailed(String, std::io::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("rendezvous: {0}")]
    Rendezvous(#[from] RendezvousError),
}

/// A started daemon: state restored, lock held, tunnel port bound.
pub struct Daemon {
    config: DaemonConfig,
    store: Store,
    listener: TcpListener,
    rendezvous: Rendezvous,
    // Released on drop.
    _lock: File,
}

impl Daemon {
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn tunnel_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
