// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Applies agent progress reports to task and image rows.
//!
//! Reports can arrive late, twice, or out of order. A succeeded image is
//! never rolled back, and a task only leaves a terminal status when an
//! image failure forces it to `Failed`.

use super::tasks::TaskError;
use crate::conflict::retry_conflicts;
use crate::tunnel::ReportHandler;
use hm_core::{Clock, Image, ImageId, ImageStatus, Task, TaskId, TaskStatus};
use hm_storage::Store;
use hm_wire::{AgentReport, ImageReport, TaskReport};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct TaskCallbacks<K: Clock> {
    store: Store,
    clock: K,
}

impl<K: Clock> TaskCallbacks<K> {
    pub fn new(store: Store, clock: K) -> Self {
        Self { store, clock }
    }

    /// Record one image's progress, then refresh its task's progress and status.
    pub fn report_image(
        &self,
        task_id: TaskId,
        image_id: ImageId,
        status: ImageStatus,
        message: &str,
    ) -> Result<Image, TaskError> {
        let image = retry_conflicts(|| {
            let image = self.store.image(image_id)?;
            if image.task_id != task_id {
                return Ok(Err(TaskError::ForeignImage { task: task_id, image: image_id }));
            }
            if image.status == ImageStatus::Succeeded && status != ImageStatus::Succeeded {
                debug!(%task_id, %image_id, %status, "ignoring report for succeeded image");
                return Ok(Ok(image));
            }
            self.store
                .update_image(image_id, image.resource_version, |row| {
                    row.status = status;
                    row.message = message.to_string();
                })
                .map(Ok)
        })??;
        self.refresh(task_id)?;
        Ok(image)
    }

    /// Record a task-level status from the agent.
    ///
    /// `Running` only advances a task that has not finished. A final status
    /// is downgraded to `Failed` when any image failed. The dispatcher owns
    /// `Pending` and `Dispatched`, so agents cannot set them.
    pub fn report_task(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        message: &str,
    ) -> Result<Task, TaskError> {
        Ok(retry_conflicts(|| {
            let task = self.store.task(task_id)?;
            let next = match status {
                TaskStatus::Pending | TaskStatus::Dispatched => {
                    debug!(%task_id, %status, "agents cannot set dispatcher statuses");
                    return Ok(task);
                }
                TaskStatus::Running if task.status.is_terminal() => return Ok(task),
                TaskStatus::Running => TaskStatus::Running,
                TaskStatus::Succeeded | TaskStatus::Failed => {
                    if self.any_failed(task_id) {
                        TaskStatus::Failed
                    } else {
                        status
                    }
                }
            };
            let process = if next.is_terminal() { 100 } else { task.process };
            self.store.update_task(task_id, task.resource_version, |row| {
                row.status = next;
                row.process = process;
                row.message = message.to_string();
            })
        })?)
    }

    fn any_failed(&self, task_id: TaskId) -> bool {
        self.store.images_for_task(task_id).iter().any(|i| i.status == ImageStatus::Failed)
    }

    /// Recompute `process` from image statuses and finish the task once every
    /// image is terminal.
    fn refresh(&self, task_id: TaskId) -> Result<Task, TaskError> {
        Ok(retry_conflicts(|| {
            let task = self.store.task(task_id)?;
            let images = self.store.images_for_task(task_id);
            let total = images.len();
            let finished = images.iter().filter(|i| i.status.is_terminal()).count();
            let failed = images.iter().any(|i| i.status == ImageStatus::Failed);
            let started = images.iter().any(|i| i.status != ImageStatus::Pending);

            let process = if total == 0 { 100 } else { (finished * 100 / total) as u8 };
            let status = if total > 0 && finished == total {
                if failed {
                    TaskStatus::Failed
                } else {
                    TaskStatus::Succeeded
                }
            } else if started && matches!(task.status, TaskStatus::Pending | TaskStatus::Dispatched)
            {
                TaskStatus::Running
            } else {
                task.status
            };

            if status == task.status && process == task.process {
                return Ok(task);
            }
            let updated = self.store.update_task(task_id, task.resource_version, |row| {
                row.status = status;
                row.process = process;
            })?;
            if status.is_terminal() && !task.status.is_terminal() {
                info!(%task_id, %status, at_ms = self.clock.epoch_ms(), "task finished");
            }
            Ok(updated)
        })?)
    }

    fn apply(&self, identity: &str, report: &AgentReport) -> Result<(), TaskError> {
        let task_id = match report {
            AgentReport::Image(r) => r.task_id,
            AgentReport::Task(r) => r.task_id,
        };
        let task = self.store.task(task_id)?;
        if task.agent_name != identity {
            return Err(TaskError::ForeignTask {
                task: task_id,
                owner: task.agent_name,
                reporter: identity.to_string(),
            });
        }
        match report {
            AgentReport::Image(ImageReport { task_id, image_id, status, message }) => {
                self.report_image(*task_id, *image_id, *status, message)?;
            }
            AgentReport::Task(TaskReport { task_id, status, message }) => {
                self.report_task(*task_id, *status, message)?;
            }
        }
        Ok(())
    }
}

impl<K: Clock> ReportHandler for TaskCallbacks<K> {
    fn handle(&self, identity: &str, report: AgentReport) {
        if let Err(e) = self.apply(identity, &report) {
            warn!(identity, ?report, error = %e, "agent report rejected");
        }
    }
}

#[cfg(test)]
#[path = "callbacks_tests.rs"]
mod tests;
