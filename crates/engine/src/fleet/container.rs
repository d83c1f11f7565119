// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reading container state from `docker ps` output.

/// Docker container an agent runs in.
pub fn container_name(agent: &str) -> String {
    format!("hm-{agent}")
}

/// Single-quote `raw` for a POSIX shell.
pub fn quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    /// Exited, created, paused, dead: anything that is not serving.
    Stopped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    pub state: ContainerState,
}

impl Container {
    /// Command listing the container called `name`, running or not.
    pub fn query(name: &str) -> String {
        format!(
            "docker ps -a --filter {} --format {}",
            quote(&format!("name=^{name}$")),
            quote("{{.Names}} {{.State}}")
        )
    }

    /// Find `name` in `docker ps` output. The name filter is a regex on
    /// docker's side, so lines are matched exactly here.
    pub fn parse(output: &str, name: &str) -> Option<Self> {
        output.lines().find_map(|line| {
            let (found, state) = line.trim().split_once(' ')?;
            if found.trim_start_matches('/') != name {
                return None;
            }
            let state = match state.trim() {
                "running" => ContainerState::Running,
                other => ContainerState::Stopped(other.to_string()),
            };
            Some(Self { name: name.to_string(), state })
        })
    }

    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
