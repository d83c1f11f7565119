// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriptions searching upstream through a connected agent.

use crate::prelude::*;
use hm_core::{MessageLevel, Subscription};
use hm_engine::{SubscriptionError, SubscriptionReconciler};

async fn connected(
    upstream: FakeRegistryBackend,
) -> (ControlPlane, SubscriptionReconciler<MemoryRendezvous, SystemClock>) {
    let store = Store::new();
    store.insert_registry(registry()).unwrap();
    let cp = ControlPlane::start(store.clone()).await;
    cp.connect("searcher", vec![upstream]).await;
    let reconciler =
        SubscriptionReconciler::new(store, cp.router(Duration::from_secs(2)), SystemClock, None);
    (cp, reconciler)
}

fn subscribe(store: &Store, raw_path: &str, size: u32) -> Subscription {
    let registry_id = store.list_registries()[0].id;
    let subscription = Subscription::builder()
        .raw_path(raw_path)
        .path(format!("docker.io/{raw_path}"))
        .agent_name("a1")
        .registry_id(registry_id)
        .size(size)
        .build();
    store.insert_subscription(subscription, 1).unwrap()
}

#[tokio::test]
async fn a_cycle_requests_at_most_ten_tags() {
    let tags: Vec<String> = (1..=15).map(|n| format!("1.{n}")).collect();
    let tag_refs: Vec<&str> = tags.iter().map(String::as_str).collect();
    let upstream = FakeRegistryBackend::new("hub").with_tags("library/nginx", &tag_refs);
    let (cp, reconciler) = connected(upstream).await;
    let sub = subscribe(&cp.store, "library/nginx", 50);

    let outcome = reconciler.sync(sub.id).await.unwrap();

    assert_eq!(outcome.tags.len(), 10);
    assert_eq!(outcome.tags.last().map(String::as_str), Some("1.15"));
    let task = cp.store.task(outcome.task_id).unwrap();
    assert_eq!(task.owner, OwnerRef::Subscription);
    assert_eq!(cp.store.images_for_task(task.id).len(), 10);
}

#[tokio::test]
async fn missing_upstream_repository_disables_the_subscription() {
    let upstream = FakeRegistryBackend::new("hub").with_tags("library/nginx", &["1.25"]);
    let (cp, reconciler) = connected(upstream).await;
    let sub = subscribe(&cp.store, "library/nope", 3);

    let err = reconciler.sync(sub.id).await.unwrap_err();
    assert!(matches!(err, SubscriptionError::UpstreamNotFound(_)), "{err}");

    let after = cp.store.subscription(sub.id).unwrap();
    assert!(!after.enable);
    let messages = cp.store.messages_for(sub.id);
    let last = messages.last().unwrap();
    assert_eq!(last.level, MessageLevel::Error);
    assert!(last.message.contains("library/nope"), "{}", last.message);
    assert!(last.message.contains("subscription disabled"), "{}", last.message);

    // Disabled subscriptions are not synced again.
    assert!(matches!(reconciler.sync(sub.id).await, Err(SubscriptionError::Disabled(_))));
}

#[tokio::test]
async fn no_connected_agent_backs_off_instead_of_disabling() {
    let store = Store::new();
    store.insert_registry(registry()).unwrap();
    let cp = ControlPlane::start(store.clone()).await;
    let reconciler =
        SubscriptionReconciler::new(store, cp.router(Duration::from_secs(1)), SystemClock, None);
    let sub = subscribe(&cp.store, "library/nginx", 3);

    let err = reconciler.sync(sub.id).await.unwrap_err();
    assert!(matches!(err, SubscriptionError::Upstream(_)), "{err}");
    let after = cp.store.subscription(sub.id).unwrap();
    assert!(after.enable);
    assert_eq!(after.fail_times, 1);
}
