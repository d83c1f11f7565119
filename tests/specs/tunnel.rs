// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tunnel registration and call correlation.

use crate::prelude::*;
use hm_engine::TunnelError;
use hm_wire::{Command, SearchSource};

fn search(repository: &str) -> Command {
    Command::SearchTags {
        source: SearchSource::All,
        namespace: "library".into(),
        repository: repository.into(),
        policy: String::new(),
        size: 3,
    }
}

#[tokio::test]
async fn reconnecting_agent_replaces_its_old_stream() {
    let cp = ControlPlane::start(Store::new()).await;
    let old = FakeRegistryBackend::new("hub").with_tags("library/nginx", &["old"]);
    let new = FakeRegistryBackend::new("hub").with_tags("library/nginx", &["new"]);

    cp.connect("a1", vec![old.clone()]).await;
    let first = cp.registry.lookup("a1").unwrap().generation;
    cp.connect("a1", vec![new.clone()]).await;
    until(|| cp.registry.lookup("a1").map(|h| h.generation != first).unwrap_or(false)).await;

    let value = cp.router(Duration::from_secs(2)).call(Some("a1"), search("nginx")).await.unwrap();
    assert_eq!(value, serde_json::json!(["new"]));
    assert!(old.calls().is_empty());
    assert_eq!(cp.registry.len(), 1);

    // The superseded stream going away does not unregister the new one.
    assert!(!cp.registry.evict("a1", first));
    assert!(cp.registry.lookup("a1").is_some());
}

#[tokio::test]
async fn unanswered_call_times_out() {
    let cp = ControlPlane::start(Store::new()).await;
    // Registered but never answers.
    let (tx, _rx) = tokio::sync::mpsc::channel(4);
    cp.registry.register("mute", tx);

    let err = cp
        .router(Duration::from_millis(200))
        .call(Some("mute"), search("nginx"))
        .await
        .unwrap_err();
    assert!(matches!(err, TunnelError::Timeout { ref identity, .. } if identity == "mute"), "{err}");
}

#[tokio::test]
async fn remote_not_found_is_reported_as_such() {
    let cp = ControlPlane::start(Store::new()).await;
    cp.connect("a1", vec![FakeRegistryBackend::new("hub")]).await;

    let err =
        cp.router(Duration::from_secs(2)).call(None, search("missing")).await.unwrap_err();
    assert!(err.is_not_found(), "{err}");
}
