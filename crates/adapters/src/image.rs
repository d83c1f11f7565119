// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Image pull/tag/push through a container runtime.

use crate::process;
use async_trait::async_trait;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to exec docker: {0}")]
    Exec(#[from] std::io::Error),
    #[error("docker {op} {image} failed: {stderr}")]
    Failed { op: &'static str, image: String, stderr: String },
}

#[async_trait]
pub trait ImageMover: Clone + Send + Sync + 'static {
    async fn login(&self, server: &str, username: &str, password: &str) -> Result<(), ImageError>;
    async fn pull(&self, image: &str) -> Result<(), ImageError>;
    async fn tag(&self, source: &str, target: &str) -> Result<(), ImageError>;
    async fn push(&self, image: &str) -> Result<(), ImageError>;
}

/// [`ImageMover`] over the `docker` CLI.
#[derive(Clone, Copy, Debug, Default)]
pub struct DockerImageMover;

impl DockerImageMover {
    async fn docker(&self, op: &'static str, image: &str, args: &[&str]) -> Result<(), ImageError> {
        let finished = process::run("docker", args, None).await?;
        if finished.success() {
            Ok(())
        } else {
            Err(ImageError::Failed { op, image: image.to_string(), stderr: finished.stderr })
        }
    }
}

#[async_trait]
impl ImageMover for DockerImageMover {
    async fn login(&self, server: &str, username: &str, password: &str) -> Result<(), ImageError> {
        if username.is_empty() {
            return Ok(());
        }
        let mut child = tokio::process::Command::new("docker")
            .args(["login", server, "-u", username, "--password-stdin"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(password.as_bytes()).await?;
        }
        let output = child.wait_with_output().await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ImageError::Failed {
                op: "login",
                image: server.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn pull(&self, image: &str) -> Result<(), ImageError> {
        self.docker("pull", image, &["pull", "-q", image]).await
    }

    async fn tag(&self, source: &str, target: &str) -> Result<(), ImageError> {
        self.docker("tag", source, &["tag", source, target]).await
    }

    async fn push(&self, image: &str) -> Result<(), ImageError> {
        self.docker("push", image, &["push", "-q", image]).await
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{ImageError, ImageMover};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ImageCall {
        Login { server: String },
        Pull(String),
        Tag { source: String, target: String },
        Push(String),
    }

    #[derive(Default)]
    struct FakeImageState {
        calls: Vec<ImageCall>,
        /// Pulls of images containing one of these fail.
        broken: Vec<String>,
        in_flight: usize,
        max_in_flight: usize,
    }

    /// Records calls and tracks how many pulls overlap.
    #[derive(Clone, Default)]
    pub struct FakeImageMover {
        inner: Arc<Mutex<FakeImageState>>,
        pull_delay: Option<Duration>,
    }

    impl FakeImageMover {
        pub fn new() -> Self {
            Self::default()
        }

        /// Each pull sleeps this long, so concurrency can be observed.
        pub fn with_pull_delay(mut self, delay: Duration) -> Self {
            self.pull_delay = Some(delay);
            self
        }

        pub fn break_image(&self, pattern: &str) {
            self.inner.lock().broken.push(pattern.to_string());
        }

        pub fn calls(&self) -> Vec<ImageCall> {
            self.inner.lock().calls.clone()
        }

        /// Highest number of pulls that were running at once.
        pub fn max_in_flight(&self) -> usize {
            self.inner.lock().max_in_flight
        }
    }

    #[async_trait]
    impl ImageMover for FakeImageMover {
        async fn login(&self, server: &str, _: &str, _: &str) -> Result<(), ImageError> {
            self.inner.lock().calls.push(ImageCall::Login { server: server.to_string() });
            Ok(())
        }

        async fn pull(&self, image: &str) -> Result<(), ImageError> {
            let broken = {
                let mut state = self.inner.lock();
                state.calls.push(ImageCall::Pull(image.to_string()));
                state.in_flight += 1;
                state.max_in_flight = state.max_in_flight.max(state.in_flight);
                state.broken.iter().any(|p| image.contains(p.as_str()))
            };
            if let Some(delay) = self.pull_delay {
                tokio::time::sleep(delay).await;
            }
            self.inner.lock().in_flight -= 1;
            if broken {
                return Err(ImageError::Failed {
                    op: "pull",
                    image: image.to_string(),
                    stderr: "manifest unknown".to_string(),
                });
            }
            Ok(())
        }

        async fn tag(&self, source: &str, target: &str) -> Result<(), ImageError> {
            self.inner
                .lock()
                .calls
                .push(ImageCall::Tag { source: source.to_string(), target: target.to_string() });
            Ok(())
        }

        async fn push(&self, image: &str) -> Result<(), ImageError> {
            self.inner.lock().calls.push(ImageCall::Push(image.to_string()));
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeImageMover, ImageCall};
