// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executes one sync job: pull each image, retag it for the target
//! registry, push it, and report progress per image.

use async_trait::async_trait;
use hm_adapters::{ImageError, ImageMover};
use hm_core::{mirror_reference, ImageStatus, TaskId, TaskStatus};
use hm_wire::{AgentReport, ImageReport, JobImage, JobSpec, TaskReport};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

#[derive(Debug, Error)]
#[error("report channel closed")]
pub struct ReportClosed;

/// Where the executor sends progress.
#[async_trait]
pub trait StatusReporter: Clone + Send + Sync + 'static {
    async fn report(&self, report: AgentReport) -> Result<(), ReportClosed>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub task_id: TaskId,
    pub succeeded: usize,
    pub failed: usize,
}

impl SyncSummary {
    /// A job with any failed image has failed.
    pub fn status(&self) -> TaskStatus {
        if self.failed > 0 {
            TaskStatus::Failed
        } else {
            TaskStatus::Succeeded
        }
    }
}

#[derive(Clone)]
pub struct SyncExecutor<M: ImageMover, S: StatusReporter> {
    mover: M,
    reporter: S,
    concurrency: usize,
}

impl<M: ImageMover, S: StatusReporter> SyncExecutor<M, S> {
    /// `concurrency` images are synced at once; zero is treated as one.
    pub fn new(mover: M, reporter: S, concurrency: usize) -> Self {
        Self { mover, reporter, concurrency: concurrency.max(1) }
    }

    pub async fn execute(&self, job: &JobSpec) -> SyncSummary {
        let task_id = job.task_id;
        let total = job.images.len();
        self.task_report(task_id, TaskStatus::Running, format!("syncing {total} images")).await;

        let registry = &job.registry;
        if let Err(e) =
            self.mover.login(&registry.server, &registry.username, &registry.password).await
        {
            warn!(task_id = %task_id, error = %e, "registry login failed");
            for image in &job.images {
                self.image_report(task_id, image, ImageStatus::Failed, e.to_string()).await;
            }
            let summary = SyncSummary { task_id, succeeded: 0, failed: total };
            self.task_report(task_id, summary.status(), format!("login failed: {e}")).await;
            return summary;
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut running = JoinSet::new();
        for image in job.images.iter().cloned() {
            let target = mirror_reference(&registry.server, &registry.namespace, &image.name);
            let semaphore = Arc::clone(&semaphore);
            let this = self.clone();
            running.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return false;
                };
                this.sync_image(task_id, &image, &target).await
            });
        }

        let mut summary = SyncSummary { task_id, succeeded: 0, failed: 0 };
        while let Some(joined) = running.join_next().await {
            match joined {
                Ok(true) => summary.succeeded += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "image sync task aborted");
                    summary.failed += 1;
                }
            }
        }

        let message = format!("{} of {total} images synced", summary.succeeded);
        info!(task_id = %task_id, succeeded = summary.succeeded, failed = summary.failed, "job finished");
        self.task_report(task_id, summary.status(), message).await;
        summary
    }

    async fn sync_image(&self, task_id: TaskId, image: &JobImage, target: &str) -> bool {
        self.image_report(task_id, image, ImageStatus::Running, String::new()).await;
        match self.move_image(&image.name, target).await {
            Ok(()) => {
                self.image_report(task_id, image, ImageStatus::Succeeded, target.to_string()).await;
                true
            }
            Err(e) => {
                warn!(task_id = %task_id, image = %image.name, error = %e, "image sync failed");
                self.image_report(task_id, image, ImageStatus::Failed, e.to_string()).await;
                false
            }
        }
    }

    async fn move_image(&self, source: &str, target: &str) -> Result<(), ImageError> {
        self.mover.pull(source).await?;
        self.mover.tag(source, target).await?;
        self.mover.push(target).await
    }

    async fn image_report(&self, task_id: TaskId, image: &JobImage, status: ImageStatus, message: String) {
        let report = AgentReport::Image(ImageReport { task_id, image_id: image.id, status, message });
        if let Err(e) = self.reporter.report(report).await {
            warn!(task_id = %task_id, error = %e, "progress report dropped");
        }
    }

    async fn task_report(&self, task_id: TaskId, status: TaskStatus, message: String) {
        let report = AgentReport::Task(TaskReport { task_id, status, message });
        if let Err(e) = self.reporter.report(report).await {
            warn!(task_id = %task_id, error = %e, "progress report dropped");
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{ReportClosed, StatusReporter};
    use async_trait::async_trait;
    use hm_wire::AgentReport;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Keeps every report in order.
    #[derive(Clone, Default)]
    pub struct RecordingReporter {
        reports: Arc<Mutex<Vec<AgentReport>>>,
    }

    impl RecordingReporter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reports(&self) -> Vec<AgentReport> {
            self.reports.lock().clone()
        }
    }

    #[async_trait]
    impl StatusReporter for RecordingReporter {
        async fn report(&self, report: AgentReport) -> Result<(), ReportClosed> {
            self.reports.lock().push(report);
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::RecordingReporter;

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
