// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sync tasks and the images they carry.

use crate::id::{ImageId, RegistryId, SubscriptionId, TaskId};
use serde::{Deserialize, Serialize};

/// Lifecycle of a Task.
///
/// `Pending` rows are picked up by the dispatcher, which moves them to
/// `Dispatched` once the job is delivered. Agents report the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Dispatched,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

crate::simple_display! {
    TaskStatus {
        Pending => "pending",
        Dispatched => "dispatched",
        Running => "running",
        Succeeded => "succeeded",
        Failed => "failed",
    }
}

/// Who created a Task. Serialized as `0` (manual) or `1` (subscription).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum OwnerRef {
    Manual,
    Subscription,
}

impl From<OwnerRef> for u8 {
    fn from(owner: OwnerRef) -> Self {
        match owner {
            OwnerRef::Manual => 0,
            OwnerRef::Subscription => 1,
        }
    }
}

impl TryFrom<u8> for OwnerRef {
    type Error = String;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Manual),
            1 => Ok(Self::Subscription),
            other => Err(format!("unknown owner ref {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub registry_id: RegistryId,
    /// Agent that executes the job.
    pub agent_name: String,
    pub status: TaskStatus,
    /// Percentage of images that reached a terminal status.
    pub process: u8,
    pub owner: OwnerRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<SubscriptionId>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at_ms: Option<u64>,
    pub created_at_ms: u64,
    pub resource_version: u64,
}

impl Task {
    pub fn new(registry_id: RegistryId, agent_name: impl Into<String>, owner: OwnerRef) -> Self {
        Self {
            id: TaskId::default(),
            registry_id,
            agent_name: agent_name.into(),
            status: TaskStatus::Pending,
            process: 0,
            owner,
            subscription_id: None,
            message: String::new(),
            deleted: false,
            deleted_at_ms: None,
            created_at_ms: 0,
            resource_version: 0,
        }
    }
}

crate::builder! {
    pub struct TaskBuilder => Task {
        into {
            agent_name: String = "agent-1",
            message: String = "",
        }
        set {
            id: TaskId = TaskId::default(),
            registry_id: RegistryId = RegistryId::new(1),
            status: TaskStatus = TaskStatus::Pending,
            process: u8 = 0,
            owner: OwnerRef = OwnerRef::Manual,
            subscription_id: Option<SubscriptionId> = None,
            deleted: bool = false,
            deleted_at_ms: Option<u64> = None,
            created_at_ms: u64 = 0,
            resource_version: u64 = 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl ImageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

crate::simple_display! {
    ImageStatus {
        Pending => "pending",
        Running => "running",
        Succeeded => "succeeded",
        Failed => "failed",
    }
}

/// One image reference to mirror within a Task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,
    pub task_id: TaskId,
    /// Source reference, e.g. `library/nginx:1.25`.
    pub name: String,
    pub status: ImageStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at_ms: Option<u64>,
    pub resource_version: u64,
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
