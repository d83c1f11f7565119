// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent containers following the status written to the store.

use crate::prelude::*;
use hm_adapters::CommandOutput;
use hm_core::FakeClock;
use hm_engine::{AgentService, FleetReconciler, FleetSettings, HostLoop, HostLoopSettings, Outcome};

struct Fleet {
    store: Store,
    shell: FakeRemoteShell,
    reconciler: FleetReconciler<FakeRemoteShell, PlainCredentialRenderer, FakeClock>,
    _dir: tempfile::TempDir,
}

fn fleet() -> Fleet {
    let dir = tempfile::tempdir().unwrap();
    let settings = FleetSettings {
        image: "hm/agent:1".into(),
        work_root: "/opt/hm/agents".into(),
        worker_binary: dir.path().join("hm-agent"),
        job_template: dir.path().join("template"),
        staging_dir: dir.path().join("staging"),
        job_repository: "https://git.local/jobs/{agent}.git".into(),
        tunnel_address: "10.0.0.1:7070".into(),
        rendezvous_url: "memory".into(),
        upstreams: Vec::new(),
        sync_concurrency: 1,
        owner: "root".into(),
    };
    let store = Store::new();
    let shell = FakeRemoteShell::new();
    let reconciler = FleetReconciler::new(
        store.clone(),
        shell.clone(),
        PlainCredentialRenderer,
        FakeClock::new(),
        Arc::new(settings),
    );
    Fleet { store, shell, reconciler, _dir: dir }
}

fn on_host(name: &str, status: AgentStatus) -> hm_core::Agent {
    let mut a = agent(name, status);
    a.host = Some("h1".into());
    a
}

#[tokio::test]
async fn healthy_running_agent_is_left_alone_on_every_pass() {
    let f = fleet();
    let a = f.store.insert_agent(on_host("a1", AgentStatus::Running)).unwrap();
    f.shell.respond("docker ps", CommandOutput::ok("hm-a1 running\n"));

    for _ in 0..3 {
        let outcome = f.reconciler.reconcile(&f.store.agent(a.id).unwrap()).await.unwrap();
        assert!(matches!(outcome, Outcome::Unchanged), "{outcome:?}");
    }

    assert!(f.shell.commands().iter().all(|c| c.contains("docker ps")));
    assert_eq!(f.store.agent(a.id).unwrap().resource_version, a.resource_version);
}

#[tokio::test]
async fn unrecognised_status_touches_nothing() {
    let f = fleet();
    let a = f.store.insert_agent(on_host("a1", AgentStatus::from("frobnicate"))).unwrap();

    f.reconciler.reconcile(&a).await.unwrap();

    assert!(f.shell.calls().is_empty());
    assert_eq!(f.store.agent(a.id).unwrap().status.as_str(), "frobnicate");
}

#[tokio::test]
async fn status_requests_are_carried_out_by_the_host_loop() {
    let f = fleet();
    let host_loop = HostLoop::new(
        "h1",
        f.store.clone(),
        f.reconciler,
        FakeClock::new(),
        HostLoopSettings {
            resync_interval: Duration::from_secs(60),
            max_failures: 3,
            retry_delay: Duration::from_millis(5),
        },
    );
    let cancel = CancellationToken::new();
    tokio::spawn(host_loop.run(cancel.clone()));

    let agents = AgentService::new(f.store.clone(), FakeClock::new());
    let a = f.store.insert_agent(on_host("a1", AgentStatus::Stopped)).unwrap();
    agents.set_status("a1", AgentStatus::Starting).unwrap();
    until(|| f.store.agent(a.id).map(|a| a.status == AgentStatus::Running).unwrap_or(false)).await;
    assert!(f.shell.commands().iter().any(|c| c.contains("docker run -d --name 'hm-a1'")));
    f.shell.respond("docker ps", CommandOutput::ok("hm-a1 running\n"));

    agents.set_status("a1", AgentStatus::Offline).unwrap();
    until(|| f.store.agent(a.id).map(|a| a.status == AgentStatus::Stopped).unwrap_or(false)).await;
    assert!(f.shell.commands().iter().any(|c| c.contains("rm -rf '/opt/hm/agents/a1'")));
    cancel.cancel();
}
