// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store guarantees the loops rely on, and surviving a restart.

use crate::prelude::*;
use hm_engine::{TaskError, TaskService};
use hm_storage::{Snapshot, StoreError};

#[test]
fn stale_writers_lose_to_the_version_guard() {
    let store = Store::new();
    let a = store.insert_agent(agent("a1", AgentStatus::Stopped)).unwrap();

    let first = store.update_agent(a.id, a.resource_version, |a| a.status = AgentStatus::Starting);
    let second = store.update_agent(a.id, a.resource_version, |a| a.status = AgentStatus::Offline);

    assert!(first.is_ok());
    assert!(second.unwrap_err().is_conflict());
    assert_eq!(store.agent(a.id).unwrap().status, AgentStatus::Starting);
}

#[test]
fn deleting_a_task_hides_it_with_its_images() {
    let store = Store::new();
    let registry_id = store.insert_registry(registry()).unwrap().id;
    let tasks = TaskService::new(store.clone(), SystemClock);
    let images = ["library/nginx:1.25".to_string(), "library/redis:7".to_string()];

    let (task, created) =
        tasks.create_task(registry_id, "a1", &images, OwnerRef::Manual, None).unwrap();
    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|i| i.task_id == task.id && i.status == ImageStatus::Pending));

    assert_eq!(tasks.delete_task(task.id).unwrap(), 2);
    assert!(store.images_for_task(task.id).is_empty());
    assert!(tasks.list(Some("a1"), None).is_empty());
    assert!(matches!(
        tasks.delete_task(task.id),
        Err(TaskError::Store(StoreError::NotFound { .. }))
    ));
}

#[test]
fn snapshot_restores_rows_and_the_id_counter() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json.zst");
    let store = Store::new();
    let registry_id = store.insert_registry(registry()).unwrap().id;
    let a = store.insert_agent(agent("a1", AgentStatus::Running)).unwrap();
    Snapshot::capture(&store).save(&path).unwrap();

    let restored = Store::from_tables(Snapshot::load(&path).unwrap().unwrap().tables);
    assert_eq!(restored.agent(a.id).unwrap(), a);
    assert_eq!(restored.registry(registry_id).unwrap().name, "target");

    // New rows never reuse an id handed out before the restart.
    let b = restored.insert_agent(agent("a2", AgentStatus::Stopped)).unwrap();
    assert!(b.id.get() > a.id.get());
}
