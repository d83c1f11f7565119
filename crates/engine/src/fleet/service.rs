// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status changes requested by operators.

use hm_core::{Agent, AgentStatus, Clock};
use hm_storage::{Store, StoreError};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("agent name is required")]
    InvalidName,
    #[error("unknown agent {0}")]
    NotFound(String),
    #[error("{0} cannot be requested")]
    NotRequestable(AgentStatus),
    #[error("agent {name} is still {current}")]
    Busy { name: String, current: AgentStatus },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct AgentService<K: Clock> {
    store: Store,
    clock: K,
}

impl<K: Clock> AgentService<K> {
    pub fn new(store: Store, clock: K) -> Self {
        Self { store, clock }
    }

    /// Record `desired` for the agent. The host loop picks the write up
    /// through the change feed.
    pub fn set_status(&self, name: &str, desired: AgentStatus) -> Result<Agent, StatusError> {
        if name.trim().is_empty() {
            return Err(StatusError::InvalidName);
        }
        if !desired.is_requestable() {
            return Err(StatusError::NotRequestable(desired));
        }
        let agent =
            self.store.agent_by_name(name).ok_or_else(|| StatusError::NotFound(name.to_string()))?;
        if agent.status.is_transient() {
            return Err(StatusError::Busy { name: agent.name, current: agent.status });
        }

        let now = self.clock.epoch_ms();
        let updated = self.store.update_agent(agent.id, agent.resource_version, |a| {
            a.status = desired;
            a.message = String::new();
            a.last_transition_ms = now;
        })?;
        info!(agent = %updated.name, from = %agent.status, to = %updated.status, "status requested");
        Ok(updated)
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
