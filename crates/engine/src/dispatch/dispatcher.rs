// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivers pending tasks to their agents.
//!
//! A poll loop feeds pending task ids into a [`WorkQueue`]; a fixed pool of
//! workers renders each task into a job project and pushes it to branch
//! `task-<id>` of the agent's job repository. Failed deliveries are retried
//! with backoff and dead-lettered once the attempt budget is spent.

use super::queue::WorkQueue;
use super::retry::RetryPolicy;
use crate::agent::BRANCH_PREFIX;
use crate::fleet::job_repository;
use hm_adapters::{CredentialRenderer, JobPublisher, PublishError};
use hm_core::{TaskId, TaskStatus};
use hm_storage::{Store, StoreError};
use hm_wire::{JobImage, JobRegistry, JobSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

const JOB_FILE: &str = "job.yaml";

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub poll_interval: Duration,
    pub workers: usize,
    pub retry: RetryPolicy,
    /// Local directory holding one job project per task.
    pub work_root: PathBuf,
    /// Project copied into a task directory before the first delivery.
    pub template_dir: PathBuf,
    /// Tunnel address written into jobs for progress reports.
    pub callback: String,
    /// Job repository URL; `{agent}` is replaced by the agent name.
    pub job_repository: String,
}

impl DispatchSettings {
    pub fn new(work_root: impl Into<PathBuf>, template_dir: impl Into<PathBuf>) -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            workers: 4,
            retry: RetryPolicy::default(),
            work_root: work_root.into(),
            template_dir: template_dir.into(),
            callback: String::new(),
            job_repository: String::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("agent {0} not found")]
    UnknownAgent(String),
    #[error("failed to render job: {0}")]
    Render(#[from] serde_yaml::Error),
    #[error("failed to prepare job project: {0}")]
    Project(#[from] std::io::Error),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct TaskDispatcher<P: JobPublisher, C: CredentialRenderer> {
    store: Store,
    publisher: P,
    credentials: C,
    settings: Arc<DispatchSettings>,
    queue: WorkQueue<TaskId>,
}

impl<P: JobPublisher, C: CredentialRenderer> TaskDispatcher<P, C> {
    pub fn new(
        store: Store,
        publisher: P,
        credentials: C,
        settings: Arc<DispatchSettings>,
    ) -> Self {
        let queue = WorkQueue::new("task-dispatch", settings.retry);
        Self { store, publisher, credentials, settings, queue }
    }

    pub fn queue(&self) -> &WorkQueue<TaskId> {
        &self.queue
    }

    /// Poll for pending tasks and drain them with the worker pool until
    /// `cancel` fires. Workers finish the task in hand before exiting.
    pub async fn run(self, cancel: CancellationToken) {
        let workers = self.settings.workers.max(1);
        info!(workers, interval = ?self.settings.poll_interval, "task dispatcher started");

        let mut pool = JoinSet::new();
        for worker in 0..workers {
            let this = self.clone();
            pool.spawn(async move { this.work(worker).await });
        }

        let mut tick = tokio::time::interval(self.settings.poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    let queued = self.enqueue_pending();
                    if queued > 0 {
                        debug!(queued, "pending tasks queued");
                    }
                }
            }
        }

        self.queue.shutdown();
        while pool.join_next().await.is_some() {}
        info!("task dispatcher stopped");
    }

    /// Queue every pending task of every known agent. Returns how many ids
    /// were offered; ids already queued or backing off are not duplicated.
    pub fn enqueue_pending(&self) -> usize {
        let mut offered = 0;
        for agent in self.store.list_agents() {
            for task in self.store.list_tasks(Some(&agent.name), Some(TaskStatus::Pending)) {
                self.queue.add(task.id);
                offered += 1;
            }
        }
        offered
    }

    async fn work(self, worker: usize) {
        while let Some(id) = self.queue.get().await {
            let span = tracing::info_span!("dispatch", worker, task_id = %id);
            match self.sync(id).instrument(span).await {
                Ok(()) => self.queue.forget(&id),
                Err(e) => self.failed(id, e),
            }
            self.queue.done(&id);
        }
    }

    fn failed(&self, id: TaskId, e: DispatchError) {
        if self.queue.retry(id) {
            warn!(task_id = %id, attempt = self.queue.failures(&id), error = %e, "task delivery failed, will retry");
            return;
        }
        let message = format!("delivery failed: {e}");
        error!(task_id = %id, error = %e, "task delivery gave up");
        // The failure count survives until the task is really marked failed,
        // so a later poll cannot restart its retries from zero.
        match self.mark(id, TaskStatus::Failed, &message) {
            Ok(()) => self.queue.dead_letter(id, message),
            Err(e) => warn!(task_id = %id, error = %e, "could not mark exhausted task failed"),
        }
    }

    /// Deliver one task. Tasks that are gone or no longer pending are skipped.
    pub async fn sync(&self, id: TaskId) -> Result<(), DispatchError> {
        let task = match self.store.task(id) {
            Ok(task) => task,
            Err(e) if e.is_not_found() => {
                debug!("task gone before delivery");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if task.status != TaskStatus::Pending {
            debug!(status = %task.status, "task already delivered");
            return Ok(());
        }

        let agent = self
            .store
            .agent_by_name(&task.agent_name)
            .ok_or_else(|| DispatchError::UnknownAgent(task.agent_name.clone()))?;
        let registry = self.store.registry(task.registry_id)?;
        let images = self.store.images_for_task(id);

        let auth = self.credentials.registry_auth(&registry);
        let job = JobSpec {
            task_id: id,
            registry: JobRegistry {
                server: auth.server,
                namespace: registry.namespace.clone(),
                username: auth.username,
                password: auth.password,
            },
            callback: self.settings.callback.clone(),
            images: images.iter().map(|i| JobImage { id: i.id, name: i.name.clone() }).collect(),
        };
        let rendered = serde_yaml::to_string(&job)?;

        let branch = format!("{BRANCH_PREFIX}{id}");
        let project = self.settings.work_root.join(&branch);
        prepare_project(&project, &self.settings.template_dir, rendered).await?;

        let repository = job_repository(&self.settings.job_repository, &agent.name);
        let origin = self.credentials.origin_url(&repository, &agent.account);
        let message = format!("task {id}: {} images", images.len());
        self.publisher.publish(&project, &origin, &branch, &message).await?;

        self.mark(id, TaskStatus::Dispatched, "")?;
        info!(agent = %agent.name, images = images.len(), "task delivered");
        Ok(())
    }

    /// Move a pending task to `status`, re-reading once on a version conflict.
    /// A task the agent already moved past `Pending` is left alone.
    fn mark(&self, id: TaskId, status: TaskStatus, message: &str) -> Result<(), StoreError> {
        let mut attempts = 0;
        loop {
            let task = self.store.task(id)?;
            if task.status != TaskStatus::Pending {
                return Ok(());
            }
            match self.store.update_task(id, task.resource_version, |row| {
                row.status = status;
                if !message.is_empty() {
                    row.message = message.to_string();
                }
            }) {
                Ok(_) => return Ok(()),
                Err(e) if e.is_conflict() && attempts == 0 => attempts += 1,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Make sure `project` exists, seed it from `template` on first use, and
/// write the job file.
async fn prepare_project(project: &Path, template: &Path, job: String) -> std::io::Result<()> {
    let project = project.to_path_buf();
    let template = template.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let fresh = !project.exists() || std::fs::read_dir(&project)?.next().is_none();
        std::fs::create_dir_all(&project)?;
        if fresh {
            copy_tree(&template, &project)?;
        }
        std::fs::write(project.join(JOB_FILE), job)
    })
    .await
    .map_err(std::io::Error::other)?
}

fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        if entry.file_name() == ".git" {
            continue;
        }
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            std::fs::create_dir_all(&target)?;
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
