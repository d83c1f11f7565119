// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn set_then_get() {
    let store = MemoryRendezvous::new();
    store.set("k", b"v", Duration::from_secs(30)).await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
    assert_eq!(store.get("other").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn values_expire() {
    let store = MemoryRendezvous::new();
    store.set("k", b"v", Duration::from_secs(30)).await.unwrap();
    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(store.get("k").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn wait_returns_value_written_later() {
    let store = MemoryRendezvous::new();
    let writer = store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        writer.set("result", b"done", Duration::from_secs(30)).await.unwrap();
    });

    let value = store.wait("result", Duration::from_secs(30)).await.unwrap();
    assert_eq!(value, b"done");
}

#[tokio::test(start_paused = true)]
async fn wait_times_out_when_nothing_arrives() {
    let store = MemoryRendezvous::new();
    store.set("unrelated", b"x", Duration::from_secs(30)).await.unwrap();

    let err = store.wait("never", Duration::from_secs(30)).await.unwrap_err();
    assert!(matches!(err, RendezvousError::Timeout { ref key, .. } if key == "never"));
}

#[tokio::test]
async fn publish_is_recorded() {
    let store = MemoryRendezvous::new();
    store.publish("topic", "key-1").await.unwrap();
    assert_eq!(store.published(), vec![("topic".to_string(), "key-1".to_string())]);
}

#[test]
fn redact_hides_credentials() {
    assert_eq!(redact("redis://u:p@cache:6379/0"), "redis://***@cache:6379/0");
    assert_eq!(redact("redis://cache:6379"), "redis://cache:6379");
}
