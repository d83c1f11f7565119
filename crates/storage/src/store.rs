// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Versioned desired-state store with change notifications.

use crate::error::{EntityKind, StoreError};
use crate::tables::{versioned_update, visible, Tables};
use hm_core::{
    Agent, AgentId, HostController, HostId, Image, ImageId, ImageStatus, MessageId, MessageLevel,
    Registry, RegistryId, RepositoryPath, Subscription, SubscriptionId, SubscriptionMessage, Task,
    TaskId, TaskStatus,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

const CHANGE_CAPACITY: usize = 1024;

/// Notification emitted after every successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Agent { name: String, host: Option<String> },
    AgentDeleted { name: String, host: Option<String> },
    Host { name: String },
    Task { id: TaskId },
    Subscription { id: SubscriptionId },
}

/// Shared handle to the store. Clones see the same rows.
#[derive(Clone)]
pub struct Store {
    tables: Arc<Mutex<Tables>>,
    changes: broadcast::Sender<Change>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::from_tables(Tables::default())
    }

    /// Resume from previously persisted rows.
    pub fn from_tables(tables: Tables) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self { tables: Arc::new(Mutex::new(tables)), changes }
    }

    /// Copy of every row, for checkpointing.
    pub fn tables(&self) -> Tables {
        self.tables.lock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    fn notify(&self, change: Change) {
        // No receivers is fine: nothing is watching yet.
        let _ = self.changes.send(change);
    }

    // ── Agents ──────────────────────────────────────────────────────────

    pub fn insert_agent(&self, mut agent: Agent) -> Result<Agent, StoreError> {
        if agent.name.trim().is_empty() {
            return Err(StoreError::invalid(EntityKind::Agent, "name is required"));
        }
        let created = {
            let mut tables = self.tables.lock();
            if tables.agents.values().any(|a| a.name == agent.name) {
                return Err(StoreError::Duplicate { kind: EntityKind::Agent, name: agent.name });
            }
            agent.id = AgentId::new(tables.next_id());
            agent.resource_version = 1;
            tables.agents.insert(agent.id.get(), agent.clone());
            agent
        };
        self.notify(Change::Agent { name: created.name.clone(), host: created.host.clone() });
        Ok(created)
    }

    pub fn agent(&self, id: AgentId) -> Result<Agent, StoreError> {
        visible(&self.tables.lock().agents, id.get()).cloned()
    }

    pub fn agent_by_name(&self, name: &str) -> Option<Agent> {
        self.tables.lock().agents.values().find(|a| a.name == name).cloned()
    }

    pub fn list_agents(&self) -> Vec<Agent> {
        self.tables.lock().agents.values().cloned().collect()
    }

    /// Agents whose `host` names the given host controller.
    pub fn agents_on_host(&self, host: &str) -> Vec<Agent> {
        self.tables
            .lock()
            .agents
            .values()
            .filter(|a| a.host.as_deref() == Some(host))
            .cloned()
            .collect()
    }

    pub fn update_agent(
        &self,
        id: AgentId,
        expected_version: u64,
        patch: impl FnOnce(&mut Agent),
    ) -> Result<Agent, StoreError> {
        let updated =
            versioned_update(&mut self.tables.lock().agents, id.get(), expected_version, patch)?;
        self.notify(Change::Agent { name: updated.name.clone(), host: updated.host.clone() });
        Ok(updated)
    }

    pub fn delete_agent(&self, id: AgentId) -> Result<Agent, StoreError> {
        let removed = self
            .tables
            .lock()
            .agents
            .remove(&id.get())
            .ok_or(StoreError::NotFound { kind: EntityKind::Agent, id: id.get() })?;
        self.notify(Change::AgentDeleted { name: removed.name.clone(), host: removed.host.clone() });
        Ok(removed)
    }

    // ── Hosts ───────────────────────────────────────────────────────────

    pub fn insert_host(&self, mut host: HostController) -> Result<HostController, StoreError> {
        if host.name.trim().is_empty() {
            return Err(StoreError::invalid(EntityKind::Host, "name is required"));
        }
        let created = {
            let mut tables = self.tables.lock();
            if tables.hosts.values().any(|h| h.name == host.name) {
                return Err(StoreError::Duplicate { kind: EntityKind::Host, name: host.name });
            }
            host.id = HostId::new(tables.next_id());
            host.resource_version = 1;
            tables.hosts.insert(host.id.get(), host.clone());
            host
        };
        self.notify(Change::Host { name: created.name.clone() });
        Ok(created)
    }

    pub fn host_by_name(&self, name: &str) -> Option<HostController> {
        self.tables.lock().hosts.values().find(|h| h.name == name).cloned()
    }

    pub fn list_hosts(&self) -> Vec<HostController> {
        self.tables.lock().hosts.values().cloned().collect()
    }

    pub fn update_host(
        &self,
        id: HostId,
        expected_version: u64,
        patch: impl FnOnce(&mut HostController),
    ) -> Result<HostController, StoreError> {
        let updated =
            versioned_update(&mut self.tables.lock().hosts, id.get(), expected_version, patch)?;
        self.notify(Change::Host { name: updated.name.clone() });
        Ok(updated)
    }

    // ── Registries ──────────────────────────────────────────────────────

    pub fn insert_registry(&self, mut registry: Registry) -> Result<Registry, StoreError> {
        if registry.server.trim().is_empty() {
            return Err(StoreError::invalid(EntityKind::Registry, "server is required"));
        }
        let mut tables = self.tables.lock();
        registry.id = RegistryId::new(tables.next_id());
        registry.resource_version = 1;
        tables.registries.insert(registry.id.get(), registry.clone());
        Ok(registry)
    }

    pub fn registry(&self, id: RegistryId) -> Result<Registry, StoreError> {
        visible(&self.tables.lock().registries, id.get()).cloned()
    }

    pub fn list_registries(&self) -> Vec<Registry> {
        self.tables.lock().registries.values().cloned().collect()
    }

    // ── Tasks and images ────────────────────────────────────────────────

    /// Insert a Task plus one Image row per name, atomically.
    pub fn create_task(
        &self,
        mut task: Task,
        images: &[String],
        now_ms: u64,
    ) -> Result<(Task, Vec<Image>), StoreError> {
        if task.agent_name.trim().is_empty() {
            return Err(StoreError::invalid(EntityKind::Task, "agent name is required"));
        }
        if images.is_empty() {
            return Err(StoreError::invalid(EntityKind::Task, "at least one image is required"));
        }
        if let Some(blank) = images.iter().find(|name| name.trim().is_empty()) {
            return Err(StoreError::invalid(EntityKind::Image, format!("bad image name {blank:?}")));
        }

        let (task, rows) = {
            let mut tables = self.tables.lock();
            visible(&tables.registries, task.registry_id.get())?;

            task.id = TaskId::new(tables.next_id());
            task.status = TaskStatus::Pending;
            task.process = 0;
            task.deleted = false;
            task.deleted_at_ms = None;
            task.created_at_ms = now_ms;
            task.resource_version = 1;
            tables.tasks.insert(task.id.get(), task.clone());

            let mut rows = Vec::with_capacity(images.len());
            for name in images {
                let image = Image {
                    id: ImageId::new(tables.next_id()),
                    task_id: task.id,
                    name: name.trim().to_string(),
                    status: ImageStatus::Pending,
                    message: String::new(),
                    deleted: false,
                    deleted_at_ms: None,
                    resource_version: 1,
                };
                tables.images.insert(image.id.get(), image.clone());
                rows.push(image);
            }
            (task, rows)
        };
        self.notify(Change::Task { id: task.id });
        Ok((task, rows))
    }

    pub fn task(&self, id: TaskId) -> Result<Task, StoreError> {
        visible(&self.tables.lock().tasks, id.get()).cloned()
    }

    /// Visible tasks, optionally narrowed to one agent and one status.
    pub fn list_tasks(&self, agent_name: Option<&str>, status: Option<TaskStatus>) -> Vec<Task> {
        self.tables
            .lock()
            .tasks
            .values()
            .filter(|t| !t.deleted)
            .filter(|t| agent_name.map_or(true, |name| t.agent_name == name))
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect()
    }

    pub fn images_for_task(&self, task_id: TaskId) -> Vec<Image> {
        self.tables
            .lock()
            .images
            .values()
            .filter(|i| i.task_id == task_id && !i.deleted)
            .cloned()
            .collect()
    }

    pub fn image(&self, id: ImageId) -> Result<Image, StoreError> {
        visible(&self.tables.lock().images, id.get()).cloned()
    }

    pub fn update_task(
        &self,
        id: TaskId,
        expected_version: u64,
        patch: impl FnOnce(&mut Task),
    ) -> Result<Task, StoreError> {
        let updated =
            versioned_update(&mut self.tables.lock().tasks, id.get(), expected_version, patch)?;
        self.notify(Change::Task { id });
        Ok(updated)
    }

    pub fn update_image(
        &self,
        id: ImageId,
        expected_version: u64,
        patch: impl FnOnce(&mut Image),
    ) -> Result<Image, StoreError> {
        let updated =
            versioned_update(&mut self.tables.lock().images, id.get(), expected_version, patch)?;
        self.notify(Change::Task { id: updated.task_id });
        Ok(updated)
    }

    /// Mark a Task and all of its Images deleted with one shared timestamp.
    /// Returns the number of images hidden.
    pub fn soft_delete_task(&self, id: TaskId, now_ms: u64) -> Result<usize, StoreError> {
        let count = {
            let mut tables = self.tables.lock();
            let task = tables
                .tasks
                .get_mut(&id.get())
                .filter(|t| !t.deleted)
                .ok_or(StoreError::NotFound { kind: EntityKind::Task, id: id.get() })?;
            task.deleted = true;
            task.deleted_at_ms = Some(now_ms);
            task.resource_version += 1;

            let mut count = 0;
            for image in tables.images.values_mut().filter(|i| i.task_id == id && !i.deleted) {
                image.deleted = true;
                image.deleted_at_ms = Some(now_ms);
                image.resource_version += 1;
                count += 1;
            }
            count
        };
        self.notify(Change::Task { id });
        Ok(count)
    }

    // ── Subscriptions ───────────────────────────────────────────────────

    pub fn insert_subscription(
        &self,
        mut subscription: Subscription,
        now_ms: u64,
    ) -> Result<Subscription, StoreError> {
        RepositoryPath::parse(&subscription.raw_path)
            .map_err(|e| StoreError::invalid(EntityKind::Subscription, e.to_string()))?;
        if subscription.agent_name.trim().is_empty() {
            return Err(StoreError::invalid(EntityKind::Subscription, "agent name is required"));
        }
        if subscription.interval_secs == 0 {
            return Err(StoreError::invalid(EntityKind::Subscription, "interval must be positive"));
        }
        let created = {
            let mut tables = self.tables.lock();
            visible(&tables.registries, subscription.registry_id.get())?;
            subscription.id = SubscriptionId::new(tables.next_id());
            subscription.created_at_ms = now_ms;
            subscription.resource_version = 1;
            tables.subscriptions.insert(subscription.id.get(), subscription.clone());
            subscription
        };
        self.notify(Change::Subscription { id: created.id });
        Ok(created)
    }

    pub fn subscription(&self, id: SubscriptionId) -> Result<Subscription, StoreError> {
        visible(&self.tables.lock().subscriptions, id.get()).cloned()
    }

    pub fn list_subscriptions(&self) -> Vec<Subscription> {
        self.tables.lock().subscriptions.values().cloned().collect()
    }

    pub fn update_subscription(
        &self,
        id: SubscriptionId,
        expected_version: u64,
        patch: impl FnOnce(&mut Subscription),
    ) -> Result<Subscription, StoreError> {
        let updated = versioned_update(
            &mut self.tables.lock().subscriptions,
            id.get(),
            expected_version,
            patch,
        )?;
        self.notify(Change::Subscription { id });
        Ok(updated)
    }

    // ── Subscription messages ───────────────────────────────────────────

    pub fn append_message(
        &self,
        subscription_id: SubscriptionId,
        level: MessageLevel,
        message: impl Into<String>,
        now_ms: u64,
    ) -> SubscriptionMessage {
        let mut tables = self.tables.lock();
        let row = SubscriptionMessage {
            id: MessageId::new(tables.next_id()),
            subscription_id,
            level,
            message: message.into(),
            created_at_ms: now_ms,
        };
        tables.messages.insert(row.id.get(), row.clone());
        row
    }

    /// Messages for one subscription, oldest first.
    pub fn messages_for(&self, subscription_id: SubscriptionId) -> Vec<SubscriptionMessage> {
        self.tables
            .lock()
            .messages
            .values()
            .filter(|m| m.subscription_id == subscription_id)
            .cloned()
            .collect()
    }

    /// Drop messages created before `cutoff_ms`. Returns how many were removed.
    pub fn purge_messages_before(&self, cutoff_ms: u64) -> usize {
        let mut tables = self.tables.lock();
        let before = tables.messages.len();
        tables.messages.retain(|_, m| m.created_at_ms >= cutoff_ms);
        before - tables.messages.len()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
