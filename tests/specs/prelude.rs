// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared setup for the scenarios.

pub use hm_adapters::{
    FakeImageMover, FakeJobSource, FakePublisher, FakeRegistryBackend, FakeRemoteShell,
    MemoryRendezvous, PlainCredentialRenderer,
};
pub use hm_core::test_support::{agent, registry};
pub use hm_core::{AgentStatus, ImageStatus, OwnerRef, SystemClock, TaskStatus};
pub use hm_engine::{
    CommandResponder, ReportHandler, TaskCallbacks, TunnelClient, TunnelRegistry, TunnelReporter,
    TunnelRouter, TunnelServer,
};
pub use hm_storage::Store;
pub use std::sync::Arc;
pub use std::time::Duration;
pub use tokio_util::sync::CancellationToken;

use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Poll `check` every 20ms for up to five seconds.
pub async fn until(mut check: impl FnMut() -> bool) {
    for _ in 0..250 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 5s");
}

/// A control plane's tunnel listener on a loopback port.
pub struct ControlPlane {
    pub store: Store,
    pub registry: TunnelRegistry,
    pub rendezvous: MemoryRendezvous,
    pub addr: SocketAddr,
    pub cancel: CancellationToken,
}

impl ControlPlane {
    pub async fn start(store: Store) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = TunnelRegistry::new();
        let callbacks = TaskCallbacks::new(store.clone(), SystemClock);
        let cancel = CancellationToken::new();
        tokio::spawn(TunnelServer::new(listener, registry.clone(), callbacks).run(cancel.clone()));
        Self { store, registry, rendezvous: MemoryRendezvous::new(), addr, cancel }
    }

    pub fn router(&self, timeout: Duration) -> TunnelRouter<MemoryRendezvous> {
        TunnelRouter::new(self.registry.clone(), self.rendezvous.clone(), timeout)
    }

    /// Dial in as `identity`, answering searches from `upstreams`, and wait
    /// until the registration is visible. Returns the agent's report sender.
    pub async fn connect(&self, identity: &str, upstreams: Vec<FakeRegistryBackend>) -> TunnelReporter {
        let (reporter, reports) = TunnelReporter::channel(64);
        let responder = CommandResponder::new(upstreams, self.rendezvous.clone());
        let client = TunnelClient::new(identity, self.addr.to_string(), responder);
        tokio::spawn(client.run(reports, self.cancel.clone()));
        let registry = self.registry.clone();
        until(|| registry.lookup(identity).is_some()).await;
        reporter
    }
}

impl Drop for ControlPlane {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
