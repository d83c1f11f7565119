// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote shell on a managed host.

use crate::process;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tracing::Instrument;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("transport failed: {0}")]
    Transport(String),
    #[error("`{command}` exited with {code}: {stderr}")]
    NonZero { command: String, code: i32, stderr: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self { stdout: stdout.into(), stderr: String::new(), exit_code: 0 }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self { stdout: String::new(), stderr: stderr.into(), exit_code }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a nonzero exit into [`ShellError::NonZero`].
    pub fn check(self, command: &str) -> Result<Self, ShellError> {
        if self.success() {
            Ok(self)
        } else {
            Err(ShellError::NonZero {
                command: command.to_string(),
                code: self.exit_code,
                stderr: self.stderr,
            })
        }
    }
}

/// Shell access to one host.
///
/// `run` only fails when the command could not be executed at all; a nonzero
/// exit comes back as a [`CommandOutput`] for the caller to interpret.
#[async_trait]
pub trait RemoteShell: Clone + Send + Sync + 'static {
    async fn run(&self, command: &str) -> Result<CommandOutput, ShellError>;

    /// Run commands in order, stopping at the first nonzero exit.
    async fn run_batch(&self, commands: &[String]) -> Result<Vec<CommandOutput>, ShellError> {
        let mut outputs = Vec::with_capacity(commands.len());
        for command in commands {
            outputs.push(self.run(command).await?.check(command)?);
        }
        Ok(outputs)
    }

    async fn upload_file(&self, local: &Path, remote: &str, mode: u32) -> Result<(), ShellError>;

    async fn upload_directory(
        &self,
        local: &Path,
        remote: &str,
        owner: &str,
    ) -> Result<(), ShellError>;
}

/// [`RemoteShell`] over the system `ssh` and `scp` binaries.
#[derive(Clone, Debug)]
pub struct SshShell {
    /// `user@host`
    target: String,
    port: Option<u16>,
}

impl SshShell {
    /// Accepts `user@host` or `user@host:port`.
    pub fn new(address: &str) -> Self {
        match address.rsplit_once(':') {
            Some((target, port)) if port.parse::<u16>().is_ok() => {
                Self { target: target.to_string(), port: port.parse().ok() }
            }
            _ => Self { target: address.to_string(), port: None },
        }
    }

    fn ssh_args<'a>(&'a self, port: &'a str) -> Vec<&'a str> {
        let mut args = vec!["-o", "BatchMode=yes", "-o", "StrictHostKeyChecking=accept-new"];
        if self.port.is_some() {
            args.extend(["-p", port]);
        }
        args.push(&self.target);
        args
    }

    async fn scp(&self, local: &Path, remote: &str, recursive: bool) -> Result<(), ShellError> {
        let port = self.port.map(|p| p.to_string()).unwrap_or_default();
        let local = local.to_string_lossy();
        let dest = format!("{}:{}", self.target, remote);
        let mut args = vec!["-q", "-o", "BatchMode=yes"];
        if recursive {
            args.push("-r");
        }
        if self.port.is_some() {
            args.extend(["-P", &port]);
        }
        args.extend([&*local, dest.as_str()]);

        let finished = process::run("scp", &args, None)
            .await
            .map_err(|e| ShellError::Transport(format!("failed to exec scp: {e}")))?;
        if finished.success() {
            Ok(())
        } else {
            Err(ShellError::NonZero {
                command: format!("scp {local} {dest}"),
                code: finished.code,
                stderr: finished.stderr,
            })
        }
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn run(&self, command: &str) -> Result<CommandOutput, ShellError> {
        let port = self.port.map(|p| p.to_string()).unwrap_or_default();
        let mut args = self.ssh_args(&port);
        args.extend(["--", command]);
        let finished = process::run("ssh", &args, None)
            .instrument(tracing::debug_span!("ssh.run", target = %self.target, command))
            .await
            .map_err(|e| ShellError::Transport(format!("failed to exec ssh: {e}")))?;
        // 255 is ssh's own failure (unreachable host, auth), not the command's.
        if finished.code == 255 {
            return Err(ShellError::Transport(finished.stderr));
        }
        Ok(CommandOutput { stdout: finished.stdout, stderr: finished.stderr, exit_code: finished.code })
    }

    async fn upload_file(&self, local: &Path, remote: &str, mode: u32) -> Result<(), ShellError> {
        self.scp(local, remote, false).await?;
        let chmod = format!("chmod {mode:o} {remote}");
        self.run(&chmod).await?.check(&chmod)?;
        Ok(())
    }

    async fn upload_directory(
        &self,
        local: &Path,
        remote: &str,
        owner: &str,
    ) -> Result<(), ShellError> {
        let prepare = format!("rm -rf {remote}");
        self.run(&prepare).await?.check(&prepare)?;
        self.scp(local, remote, true).await?;
        let chown = format!("chown -R {owner} {remote}");
        self.run(&chown).await?.check(&chown)?;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{CommandOutput, RemoteShell, ShellError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ShellCall {
        Run(String),
        UploadFile { local: PathBuf, remote: String, mode: u32 },
        UploadDirectory { local: PathBuf, remote: String, owner: String },
    }

    impl ShellCall {
        pub fn command(&self) -> Option<&str> {
            match self {
                Self::Run(cmd) => Some(cmd),
                _ => None,
            }
        }
    }

    #[derive(Default)]
    struct FakeShellState {
        calls: Vec<ShellCall>,
        /// (substring, scripted output); the latest matching rule wins.
        rules: Vec<(String, CommandOutput)>,
        /// Commands containing one of these fail at the transport level.
        unreachable: Vec<String>,
        fail_uploads: bool,
    }

    /// Scriptable [`RemoteShell`] that records every call.
    ///
    /// Unscripted commands succeed with empty output.
    #[derive(Clone, Default)]
    pub struct FakeRemoteShell {
        inner: Arc<Mutex<FakeShellState>>,
    }

    impl FakeRemoteShell {
        pub fn new() -> Self {
            Self::default()
        }

        /// Commands containing `pattern` produce `output`.
        pub fn respond(&self, pattern: &str, output: CommandOutput) {
            self.inner.lock().rules.push((pattern.to_string(), output));
        }

        /// Commands containing `pattern` return a transport error.
        pub fn unreachable_on(&self, pattern: &str) {
            self.inner.lock().unreachable.push(pattern.to_string());
        }

        pub fn fail_uploads(&self, fail: bool) {
            self.inner.lock().fail_uploads = fail;
        }

        pub fn calls(&self) -> Vec<ShellCall> {
            self.inner.lock().calls.clone()
        }

        /// Only the `run` commands, in order.
        pub fn commands(&self) -> Vec<String> {
            self.calls().iter().filter_map(|c| c.command().map(str::to_string)).collect()
        }

        pub fn clear(&self) {
            self.inner.lock().calls.clear();
        }
    }

    #[async_trait]
    impl RemoteShell for FakeRemoteShell {
        async fn run(&self, command: &str) -> Result<CommandOutput, ShellError> {
            let mut state = self.inner.lock();
            state.calls.push(ShellCall::Run(command.to_string()));
            if state.unreachable.iter().any(|p| command.contains(p.as_str())) {
                return Err(ShellError::Transport(format!("host unreachable running {command}")));
            }
            let output = state
                .rules
                .iter()
                .rev()
                .find(|(pattern, _)| command.contains(pattern.as_str()))
                .map(|(_, output)| output.clone())
                .unwrap_or_default();
            Ok(output)
        }

        async fn upload_file(
            &self,
            local: &Path,
            remote: &str,
            mode: u32,
        ) -> Result<(), ShellError> {
            let mut state = self.inner.lock();
            state.calls.push(ShellCall::UploadFile {
                local: local.to_path_buf(),
                remote: remote.to_string(),
                mode,
            });
            if state.fail_uploads {
                return Err(ShellError::Transport("upload refused".to_string()));
            }
            Ok(())
        }

        async fn upload_directory(
            &self,
            local: &Path,
            remote: &str,
            owner: &str,
        ) -> Result<(), ShellError> {
            let mut state = self.inner.lock();
            state.calls.push(ShellCall::UploadDirectory {
                local: local.to_path_buf(),
                remote: remote.to_string(),
                owner: owner.to_string(),
            });
            if state.fail_uploads {
                return Err(ShellError::Transport("upload refused".to_string()));
            }
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeRemoteShell, ShellCall};

#[cfg(test)]
#[path = "shell_tests.rs"]
mod tests;
