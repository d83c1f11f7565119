// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::{Agent, AgentStatus, HostController, Registry};

/// Proptest strategies for entity status values.
pub mod strategies {
    use crate::{AgentStatus, TaskStatus};
    use proptest::prelude::*;

    pub fn arb_agent_status() -> impl Strategy<Value = AgentStatus> {
        prop_oneof![
            Just(AgentStatus::Starting),
            Just(AgentStatus::Running),
            Just(AgentStatus::Stopping),
            Just(AgentStatus::Stopped),
            Just(AgentStatus::Restarting),
            Just(AgentStatus::Upgrading),
            Just(AgentStatus::Offline),
            Just(AgentStatus::Deleting),
            Just(AgentStatus::NotStarted),
            Just(AgentStatus::Error),
            "[a-z]{3,10}".prop_map(AgentStatus::from),
        ]
    }

    pub fn arb_task_status() -> impl Strategy<Value = TaskStatus> {
        prop_oneof![
            Just(TaskStatus::Pending),
            Just(TaskStatus::Dispatched),
            Just(TaskStatus::Running),
            Just(TaskStatus::Succeeded),
            Just(TaskStatus::Failed),
        ]
    }
}

/// Agent on `host-1` with the given name and status.
pub fn agent(name: &str, status: AgentStatus) -> Agent {
    Agent::builder().name(name).status(status).build()
}

pub fn host(name: &str) -> HostController {
    HostController::new(name, format!("root@{name}.internal"))
}

pub fn registry() -> Registry {
    Registry::builder().build()
}
