// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use hm_core::test_support::registry;
use hm_core::{FakeClock, OwnerRef};
use yare::parameterized;

struct Fixture {
    callbacks: TaskCallbacks<FakeClock>,
    store: Store,
    task: Task,
    images: Vec<Image>,
}

fn fixture(names: &[&str]) -> Fixture {
    let store = Store::new();
    let registry = store.insert_registry(registry()).unwrap();
    let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
    let (task, images) = store
        .create_task(Task::new(registry.id, "agent-1", OwnerRef::Manual), &names, 1)
        .unwrap();
    Fixture { callbacks: TaskCallbacks::new(store.clone(), FakeClock::new()), store, task, images }
}

impl Fixture {
    fn image(&self, n: usize, status: ImageStatus) {
        self.callbacks.report_image(self.task.id, self.images[n].id, status, "").unwrap();
    }

    fn task(&self) -> Task {
        self.store.task(self.task.id).unwrap()
    }
}

#[test]
fn first_image_progress_moves_task_to_running() {
    let f = fixture(&["a:1", "b:1"]);
    f.image(0, ImageStatus::Running);
    let task = f.task();
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.process, 0);
}

#[test]
fn progress_counts_terminal_images() {
    let f = fixture(&["a:1", "b:1", "c:1", "d:1"]);
    f.image(0, ImageStatus::Succeeded);
    assert_eq!(f.task().process, 25);
    f.image(1, ImageStatus::Failed);
    assert_eq!(f.task().process, 50);
    assert_eq!(f.task().status, TaskStatus::Running);
}

#[parameterized(
    all_succeeded = { ImageStatus::Succeeded, ImageStatus::Succeeded, TaskStatus::Succeeded },
    one_failed = { ImageStatus::Succeeded, ImageStatus::Failed, TaskStatus::Failed },
    all_failed = { ImageStatus::Failed, ImageStatus::Failed, TaskStatus::Failed },
)]
fn task_finishes_when_every_image_is_terminal(a: ImageStatus, b: ImageStatus, expected: TaskStatus) {
    let f = fixture(&["a:1", "b:1"]);
    f.image(0, a);
    f.image(1, b);
    let task = f.task();
    assert_eq!(task.status, expected);
    assert_eq!(task.process, 100);
}

#[test]
fn succeeded_image_is_never_rolled_back() {
    let f = fixture(&["a:1", "b:1"]);
    f.image(0, ImageStatus::Succeeded);
    f.image(0, ImageStatus::Running);
    f.image(0, ImageStatus::Failed);
    assert_eq!(f.store.image(f.images[0].id).unwrap().status, ImageStatus::Succeeded);
}

#[test]
fn failed_image_may_be_retried_to_success() {
    let f = fixture(&["a:1"]);
    f.image(0, ImageStatus::Failed);
    assert_eq!(f.task().status, TaskStatus::Failed);
    f.image(0, ImageStatus::Succeeded);
    assert_eq!(f.task().status, TaskStatus::Succeeded);
}

#[test]
fn image_of_another_task_is_rejected() {
    let f = fixture(&["a:1"]);
    let (other, other_images) = f
        .store
        .create_task(Task::new(f.task.registry_id, "agent-1", OwnerRef::Manual), &["b:1".to_string()], 1)
        .unwrap();
    let err = f
        .callbacks
        .report_image(f.task.id, other_images[0].id, ImageStatus::Running, "")
        .unwrap_err();
    assert!(matches!(err, TaskError::ForeignImage { task, .. } if task == f.task.id));
    assert_eq!(f.store.task(other.id).unwrap().status, TaskStatus::Pending);
}

#[test]
fn report_task_succeeded_is_forced_to_failed_when_an_image_failed() {
    let f = fixture(&["a:1", "b:1"]);
    f.image(0, ImageStatus::Failed);
    let task = f.callbacks.report_task(f.task.id, TaskStatus::Succeeded, "done").unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.message, "done");
    assert_eq!(task.process, 100);
}

#[test]
fn late_running_report_does_not_reopen_finished_task() {
    let f = fixture(&["a:1"]);
    f.image(0, ImageStatus::Succeeded);
    f.callbacks.report_task(f.task.id, TaskStatus::Running, "late").unwrap();
    assert_eq!(f.task().status, TaskStatus::Succeeded);
}

#[parameterized(pending = { TaskStatus::Pending }, dispatched = { TaskStatus::Dispatched })]
fn agents_cannot_set_dispatcher_statuses(status: TaskStatus) {
    let f = fixture(&["a:1"]);
    let before = f.task();
    f.callbacks.report_task(f.task.id, status, "").unwrap();
    assert_eq!(f.task(), before);
}

#[test]
fn handler_ignores_reports_from_other_agents() {
    let f = fixture(&["a:1"]);
    f.callbacks.handle(
        "intruder",
        AgentReport::Image(ImageReport {
            task_id: f.task.id,
            image_id: f.images[0].id,
            status: ImageStatus::Succeeded,
            message: String::new(),
        }),
    );
    assert_eq!(f.store.image(f.images[0].id).unwrap().status, ImageStatus::Pending);

    f.callbacks.handle(
        "agent-1",
        AgentReport::Task(TaskReport {
            task_id: f.task.id,
            status: TaskStatus::Running,
            message: "go".to_string(),
        }),
    );
    assert_eq!(f.task().status, TaskStatus::Running);
}

#[test]
fn reports_for_deleted_tasks_are_dropped() {
    let f = fixture(&["a:1"]);
    f.store.soft_delete_task(f.task.id, 5).unwrap();
    assert!(f.callbacks.report_task(f.task.id, TaskStatus::Running, "").is_err());
}
