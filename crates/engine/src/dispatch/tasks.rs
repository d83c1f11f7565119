// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Creating and deleting tasks.

use hm_core::{Clock, Image, OwnerRef, RegistryId, SubscriptionId, Task, TaskId, TaskStatus};
use hm_storage::{Store, StoreError};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("image {image} does not belong to task {task}")]
    ForeignImage { task: TaskId, image: hm_core::ImageId },
    #[error("task {task} belongs to {owner}, not {reporter}")]
    ForeignTask { task: TaskId, owner: String, reporter: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct TaskService<K: Clock> {
    store: Store,
    clock: K,
}

impl<K: Clock> TaskService<K> {
    pub fn new(store: Store, clock: K) -> Self {
        Self { store, clock }
    }

    /// Create a pending task with one image row per name.
    pub fn create_task(
        &self,
        registry_id: RegistryId,
        agent_name: &str,
        images: &[String],
        owner: OwnerRef,
        subscription_id: Option<SubscriptionId>,
    ) -> Result<(Task, Vec<Image>), TaskError> {
        let mut task = Task::new(registry_id, agent_name, owner);
        task.subscription_id = subscription_id;
        let (task, images) = self.store.create_task(task, images, self.clock.epoch_ms())?;
        info!(task_id = %task.id, agent = %task.agent_name, images = images.len(), ?owner, "task created");
        Ok((task, images))
    }

    /// Soft-delete a task and its images. Returns the number of images hidden.
    pub fn delete_task(&self, id: TaskId) -> Result<usize, TaskError> {
        let hidden = self.store.soft_delete_task(id, self.clock.epoch_ms())?;
        info!(task_id = %id, images = hidden, "task deleted");
        Ok(hidden)
    }

    pub fn task_with_images(&self, id: TaskId) -> Result<(Task, Vec<Image>), TaskError> {
        let task = self.store.task(id)?;
        Ok((task, self.store.images_for_task(id)))
    }

    pub fn list(&self, agent_name: Option<&str>, status: Option<TaskStatus>) -> Vec<Task> {
        self.store.list_tasks(agent_name, status)
    }
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
