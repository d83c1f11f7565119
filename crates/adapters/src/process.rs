// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local subprocess helper shared by the CLI-backed adapters.

use std::path::Path;

/// Captured result of a finished subprocess.
pub(crate) struct Finished {
    pub stdout: String,
    pub stderr: String,
    /// `-1` when the process was killed by a signal.
    pub code: i32,
}

impl Finished {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Run `program args..` to completion. `Err` only when it could not be started.
pub(crate) async fn run(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
) -> Result<Finished, std::io::Error> {
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args).kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let output = cmd.output().await?;
    Ok(Finished {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        code: output.status.code().unwrap_or(-1),
    })
}
