// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::agent::RecordingReporter;
use hm_adapters::{FakeImageMover, FakeJobSource};
use hm_core::ImageId;
use hm_wire::{AgentReport, JobImage, JobRegistry};

fn job_yaml(task_id: u64) -> String {
    let job = JobSpec {
        task_id: TaskId::new(task_id),
        registry: JobRegistry {
            server: "registry.local:5000".into(),
            namespace: "mirror".into(),
            username: String::new(),
            password: String::new(),
        },
        callback: "127.0.0.1:7700".into(),
        images: vec![JobImage { id: ImageId::new(task_id * 10), name: "nginx:1.25".into() }],
    };
    serde_yaml::to_string(&job).unwrap()
}

#[tokio::test]
async fn poll_skips_executed_and_malformed_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let source = FakeJobSource::new();
    source.push("task-3", &job_yaml(3));
    source.push("task-1", &job_yaml(1));
    source.push("task-2", "not: [valid");
    source.push("task-9", &job_yaml(4));
    source.push("task-x", &job_yaml(5));

    let mut pickup = JobPickup::open(source, dir.path().join("executed.json")).await.unwrap();
    pickup.mark_executed(TaskId::new(3)).await.unwrap();

    let ids: Vec<TaskId> = pickup.poll().await.unwrap().iter().map(|j| j.task_id).collect();
    assert_eq!(ids, vec![TaskId::new(1)]);
}

#[tokio::test]
async fn ledger_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = dir.path().join("state/executed.json");
    let source = FakeJobSource::new();
    source.push("task-1", &job_yaml(1));

    let mut pickup = JobPickup::open(source.clone(), &ledger).await.unwrap();
    pickup.mark_executed(TaskId::new(1)).await.unwrap();
    drop(pickup);

    let reopened = JobPickup::open(source, &ledger).await.unwrap();
    assert!(reopened.is_executed(TaskId::new(1)));
    assert!(reopened.poll().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn run_jobs_executes_each_job_once() {
    let dir = tempfile::tempdir().unwrap();
    let source = FakeJobSource::new();
    source.push("task-1", &job_yaml(1));
    let pickup = JobPickup::open(source, dir.path().join("executed.json")).await.unwrap();
    let mover = FakeImageMover::new();
    let reporter = RecordingReporter::new();
    let executor = SyncExecutor::new(mover.clone(), reporter.clone(), 1);
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(run_jobs(pickup, executor, Duration::from_secs(5), cancel.clone()));
    tokio::time::sleep(Duration::from_secs(16)).await;
    cancel.cancel();
    handle.await.unwrap();

    let finished = reporter
        .reports()
        .into_iter()
        .filter(|r| matches!(r, AgentReport::Task(t) if t.status.is_terminal()))
        .count();
    assert_eq!(finished, 1);
}

#[tokio::test(flavor = "current_thread")]
async fn corrupt_ledger_is_reported_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = dir.path().join("executed.json");
    std::fs::write(&ledger, "{not json").unwrap();

    let err = JobPickup::open(FakeJobSource::new(), &ledger).await.err().unwrap();
    assert!(matches!(err, PickupError::Ledger(_)), "{err}");
}
