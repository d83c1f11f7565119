// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Finding new jobs on the job repository and remembering which ran.

use super::executor::{StatusReporter, SyncExecutor};
use hm_adapters::{ImageMover, JobSource, PublishError};
use hm_core::TaskId;
use hm_wire::JobSpec;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Job branches are named `task-<id>`.
pub const BRANCH_PREFIX: &str = "task-";

#[derive(Debug, Error)]
pub enum PickupError {
    #[error(transparent)]
    Source(#[from] PublishError),
    #[error("ledger io: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger json: {0}")]
    Ledger(#[from] serde_json::Error),
}

/// Tracks executed task ids in a JSON ledger so a restarted agent does not
/// run a job twice.
pub struct JobPickup<J: JobSource> {
    source: J,
    ledger: PathBuf,
    executed: BTreeSet<TaskId>,
}

impl<J: JobSource> JobPickup<J> {
    pub async fn open(source: J, ledger: impl Into<PathBuf>) -> Result<Self, PickupError> {
        let ledger = ledger.into();
        let path = ledger.clone();
        let executed = tokio::task::spawn_blocking(move || read_ledger(&path))
            .await
            .map_err(std::io::Error::other)??;
        Ok(Self { source, ledger, executed })
    }

    /// Jobs published since the last poll that have not run yet, oldest first.
    pub async fn poll(&self) -> Result<Vec<JobSpec>, PickupError> {
        let mut jobs = Vec::new();
        for fetched in self.source.fetch(BRANCH_PREFIX).await? {
            let Some(task_id) = parse_branch(&fetched.branch) else {
                warn!(branch = %fetched.branch, "ignoring branch without a task id");
                continue;
            };
            if self.executed.contains(&task_id) {
                continue;
            }
            match serde_yaml::from_str::<JobSpec>(&fetched.job_yaml) {
                Ok(job) if job.task_id == task_id => jobs.push(job),
                Ok(job) => warn!(branch = %fetched.branch, task_id = %job.task_id, "job file names another task"),
                Err(e) => warn!(branch = %fetched.branch, error = %e, "unreadable job file"),
            }
        }
        jobs.sort_by_key(|job| job.task_id);
        Ok(jobs)
    }

    pub fn is_executed(&self, task_id: TaskId) -> bool {
        self.executed.contains(&task_id)
    }

    pub async fn mark_executed(&mut self, task_id: TaskId) -> Result<(), PickupError> {
        if !self.executed.insert(task_id) {
            return Ok(());
        }
        let bytes = serde_json::to_vec(&self.executed)?;
        let path = self.ledger.clone();
        tokio::task::spawn_blocking(move || write_ledger(&path, &bytes))
            .await
            .map_err(std::io::Error::other)??;
        Ok(())
    }
}

fn read_ledger(path: &Path) -> Result<BTreeSet<TaskId>, PickupError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeSet::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_ledger(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

fn parse_branch(branch: &str) -> Option<TaskId> {
    branch.strip_prefix(BRANCH_PREFIX)?.parse().ok().map(TaskId::new)
}

/// Poll for jobs every `interval` and run them one at a time.
pub async fn run_jobs<J, M, S>(
    mut pickup: JobPickup<J>,
    executor: SyncExecutor<M, S>,
    interval: Duration,
    cancel: CancellationToken,
) where
    J: JobSource,
    M: ImageMover,
    S: StatusReporter,
{
    let mut tick = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tick.tick() => {}
        }
        let jobs = match pickup.poll().await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "job poll failed");
                continue;
            }
        };
        for job in jobs {
            if cancel.is_cancelled() {
                return;
            }
            info!(task_id = %job.task_id, images = job.images.len(), "starting job");
            executor.execute(&job).await;
            if let Err(e) = pickup.mark_executed(job.task_id).await {
                warn!(task_id = %job.task_id, error = %e, "failed to record executed job");
            }
        }
    }
}

#[cfg(test)]
#[path = "pickup_tests.rs"]
mod tests;
