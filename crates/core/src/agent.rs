// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent entity and its lifecycle status.
//!
//! The API writes a verb state (`Starting`, `Stopping`, ...) and the fleet
//! reconciler resolves it into a stable state (`Running`, `Stopped`) or `Error`.

use crate::id::AgentId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Desired or resolved lifecycle status of an Agent.
///
/// Stored as a string. Values written by older or newer writers that this build
/// does not know are kept verbatim in [`AgentStatus::Unrecognized`] so they
/// round-trip without being rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Restarting,
    Upgrading,
    Offline,
    Deleting,
    NotStarted,
    Error,
    Unrecognized(String),
}

impl AgentStatus {
    /// Verb states that are still waiting on the reconciler.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Starting | Self::Stopping | Self::Restarting | Self::Upgrading | Self::Deleting
        )
    }

    /// States a client may request through the status-change API.
    pub fn is_requestable(&self) -> bool {
        self.is_transient() || matches!(self, Self::Offline)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Restarting => "Restarting",
            Self::Upgrading => "Upgrading",
            Self::Offline => "Offline",
            Self::Deleting => "Deleting",
            Self::NotStarted => "NotStarted",
            Self::Error => "Error",
            Self::Unrecognized(raw) => raw,
        }
    }
}

impl From<&str> for AgentStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "Starting" => Self::Starting,
            "Running" => Self::Running,
            "Stopping" => Self::Stopping,
            "Stopped" => Self::Stopped,
            "Restarting" => Self::Restarting,
            "Upgrading" => Self::Upgrading,
            "Offline" => Self::Offline,
            "Deleting" => Self::Deleting,
            "NotStarted" | "Unknown" | "" => Self::NotStarted,
            "Error" => Self::Error,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

impl From<String> for AgentStatus {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<AgentStatus> for String {
    fn from(status: AgentStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External account the agent's job repository is accessed with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCredentials {
    pub username: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    /// Unique; the agent container on the host is named after it.
    pub name: String,
    /// Name of the HostController that owns this agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub status: AgentStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub account: AccountCredentials,
    pub resource_version: u64,
    #[serde(default)]
    pub last_transition_ms: u64,
}

impl Agent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: AgentId::default(),
            name: name.into(),
            host: None,
            status: AgentStatus::NotStarted,
            message: String::new(),
            account: AccountCredentials::default(),
            resource_version: 0,
            last_transition_ms: 0,
        }
    }
}

crate::builder! {
    pub struct AgentBuilder => Agent {
        into {
            name: String = "agent-1",
            message: String = "",
        }
        set {
            id: AgentId = AgentId::default(),
            host: Option<String> = Some("host-1".to_string()),
            status: AgentStatus = AgentStatus::NotStarted,
            account: AccountCredentials = AccountCredentials {
                username: "mirror".to_string(),
                token: "s3cret".to_string(),
            },
            resource_version: u64 = 0,
            last_transition_ms: u64 = 0,
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
