// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job delivery by version control: the control plane commits a rendered job
//! project and pushes it to a repository the agent pulls from.

use crate::process;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to exec git: {0}")]
    Exec(#[from] std::io::Error),
    #[error("git {step} failed: {stderr}")]
    Git { step: String, stderr: String },
}

#[async_trait]
pub trait JobPublisher: Clone + Send + Sync + 'static {
    /// Commit everything under `project_dir` and push it to `branch` on `origin`.
    ///
    /// Publishing an unchanged project is not an error.
    async fn publish(
        &self,
        project_dir: &Path,
        origin: &str,
        branch: &str,
        message: &str,
    ) -> Result<(), PublishError>;
}

/// [`JobPublisher`] driving the system `git` binary.
#[derive(Clone, Debug)]
pub struct GitPublisher {
    author_name: String,
    author_email: String,
}

impl Default for GitPublisher {
    fn default() -> Self {
        Self::new("hm", "hm@localhost")
    }
}

impl GitPublisher {
    pub fn new(author_name: impl Into<String>, author_email: impl Into<String>) -> Self {
        Self { author_name: author_name.into(), author_email: author_email.into() }
    }

    async fn git(&self, dir: &Path, step: &str, args: &[&str]) -> Result<String, PublishError> {
        let finished = process::run("git", args, Some(dir)).await?;
        if finished.success() {
            Ok(finished.stdout)
        } else {
            Err(PublishError::Git { step: step.to_string(), stderr: finished.stderr })
        }
    }
}

#[async_trait]
impl JobPublisher for GitPublisher {
    async fn publish(
        &self,
        project_dir: &Path,
        origin: &str,
        branch: &str,
        message: &str,
    ) -> Result<(), PublishError> {
        if !project_dir.join(".git").exists() {
            self.git(project_dir, "init", &["init", "-q"]).await?;
        }

        let remotes = self.git(project_dir, "remote", &["remote"]).await?;
        if remotes.lines().any(|r| r.trim() == "origin") {
            self.git(project_dir, "remote set-url", &["remote", "set-url", "origin", origin])
                .await?;
        } else {
            self.git(project_dir, "remote add", &["remote", "add", "origin", origin]).await?;
        }

        self.git(project_dir, "add", &["add", "-A"]).await?;

        let name = format!("user.name={}", self.author_name);
        let email = format!("user.email={}", self.author_email);
        let status = self.git(project_dir, "status", &["status", "--porcelain"]).await?;
        if !status.trim().is_empty() {
            self.git(project_dir, "commit", &["-c", &name, "-c", &email, "commit", "-q", "-m", message])
                .await?;
        }

        let refspec = format!("HEAD:refs/heads/{branch}");
        self.git(project_dir, "push", &["push", "-q", "--force", "origin", &refspec]).await?;
        tracing::debug!(dir = %project_dir.display(), branch, "job project pushed");
        Ok(())
    }
}

/// A published job as the agent sees it: the branch name and its job file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedJob {
    pub branch: String,
    pub job_yaml: String,
}

/// Agent side of [`JobPublisher`]: lists the job branches on the origin.
#[async_trait]
pub trait JobSource: Clone + Send + Sync + 'static {
    /// Every branch starting with `prefix`, with the contents of its `job.yaml`.
    async fn fetch(&self, prefix: &str) -> Result<Vec<FetchedJob>, PublishError>;
}

/// [`JobSource`] over a local checkout whose `origin` was configured when
/// the agent was staged.
#[derive(Clone, Debug)]
pub struct GitJobSource {
    checkout: PathBuf,
}

impl GitJobSource {
    pub fn new(checkout: impl Into<PathBuf>) -> Self {
        Self { checkout: checkout.into() }
    }

    async fn git(&self, step: &str, args: &[&str]) -> Result<String, PublishError> {
        let finished = process::run("git", args, Some(&self.checkout)).await?;
        if finished.success() {
            Ok(finished.stdout)
        } else {
            Err(PublishError::Git { step: step.to_string(), stderr: finished.stderr })
        }
    }
}

#[async_trait]
impl JobSource for GitJobSource {
    async fn fetch(&self, prefix: &str) -> Result<Vec<FetchedJob>, PublishError> {
        let refspec = format!("+refs/heads/{prefix}*:refs/remotes/origin/{prefix}*");
        self.git("fetch", &["fetch", "-q", "--prune", "origin", &refspec]).await?;

        let pattern = format!("refs/remotes/origin/{prefix}*");
        let refs = self
            .git("for-each-ref", &["for-each-ref", "--format=%(refname:strip=3)", &pattern])
            .await?;

        let mut jobs = Vec::new();
        for branch in refs.lines().map(str::trim).filter(|b| !b.is_empty()) {
            let object = format!("origin/{branch}:job.yaml");
            match self.git("show", &["show", &object]).await {
                Ok(job_yaml) => jobs.push(FetchedJob { branch: branch.to_string(), job_yaml }),
                Err(e) => tracing::warn!(branch, error = %e, "job branch without job.yaml"),
            }
        }
        Ok(jobs)
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{FetchedJob, JobPublisher, JobSource, PublishError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    /// Recorded publish, with the job file as it was at push time.
    #[derive(Debug, Clone)]
    pub struct PublishCall {
        pub project_dir: PathBuf,
        pub origin: String,
        pub branch: String,
        pub message: String,
        pub job_yaml: Option<String>,
    }

    #[derive(Default)]
    struct FakePublishState {
        calls: Vec<PublishCall>,
        failures_left: u32,
    }

    #[derive(Clone, Default)]
    pub struct FakePublisher {
        inner: Arc<Mutex<FakePublishState>>,
    }

    impl FakePublisher {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `n` publishes fail.
        pub fn fail_next(&self, n: u32) {
            self.inner.lock().failures_left = n;
        }

        pub fn calls(&self) -> Vec<PublishCall> {
            self.inner.lock().calls.clone()
        }
    }

    /// Jobs the fake source hands out, keyed by branch.
    #[derive(Clone, Default)]
    pub struct FakeJobSource {
        jobs: Arc<Mutex<Vec<FetchedJob>>>,
    }

    impl FakeJobSource {
        pub fn new() -> Self {
            Self::default()
        }

        /// Add or replace the job on `branch`.
        pub fn push(&self, branch: &str, job_yaml: &str) {
            let mut jobs = self.jobs.lock();
            jobs.retain(|j| j.branch != branch);
            jobs.push(FetchedJob { branch: branch.to_string(), job_yaml: job_yaml.to_string() });
        }
    }

    #[async_trait]
    impl JobSource for FakeJobSource {
        async fn fetch(&self, prefix: &str) -> Result<Vec<FetchedJob>, PublishError> {
            Ok(self.jobs.lock().iter().filter(|j| j.branch.starts_with(prefix)).cloned().collect())
        }
    }

    #[async_trait]
    impl JobPublisher for FakePublisher {
        async fn publish(
            &self,
            project_dir: &Path,
            origin: &str,
            branch: &str,
            message: &str,
        ) -> Result<(), PublishError> {
            let job_yaml = std::fs::read_to_string(project_dir.join("job.yaml")).ok();
            let mut state = self.inner.lock();
            state.calls.push(PublishCall {
                project_dir: project_dir.to_path_buf(),
                origin: origin.to_string(),
                branch: branch.to_string(),
                message: message.to_string(),
                job_yaml,
            });
            if state.failures_left > 0 {
                state.failures_left -= 1;
                return Err(PublishError::Git {
                    step: "push".to_string(),
                    stderr: "remote hung up".to_string(),
                });
            }
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeJobSource, FakePublisher, PublishCall};
