// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One sync cycle of a subscription.
//!
//! A cycle searches upstream through the tunnel, then creates a task that
//! mirrors every returned tag. Conditions a retry cannot fix (bad path or
//! policy, missing repository, no matching tags) disable the subscription
//! until someone re-enables it. Anything else counts as a failure and
//! backs the next run off.

use super::policy::TagPolicy;
use crate::conflict::retry_conflicts;
use crate::dispatch::{TaskError, TaskService};
use crate::tunnel::{TunnelError, TunnelRouter};
use hm_adapters::RendezvousStore;
use hm_core::subscription::InvalidPath;
use hm_core::{Clock, MessageLevel, OwnerRef, Subscription, SubscriptionId, TaskId};
use hm_storage::{Store, StoreError};
use hm_wire::{Command, SearchSource};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("subscription {0} is disabled")]
    Disabled(SubscriptionId),
    #[error(transparent)]
    InvalidPath(#[from] InvalidPath),
    #[error("invalid tag policy {policy:?}: {reason}")]
    InvalidPolicy { policy: String, reason: String },
    #[error("upstream repository {0} not found")]
    UpstreamNotFound(String),
    #[error("no tags of {path} match policy {policy:?}")]
    NoMatchingTags { path: String, policy: String },
    #[error("upstream search failed: {0}")]
    Upstream(#[from] TunnelError),
    #[error("malformed search result: {0}")]
    SearchResult(#[from] serde_json::Error),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SubscriptionError {
    /// Errors that disable the subscription instead of backing it off.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::InvalidPath(_)
                | Self::InvalidPolicy { .. }
                | Self::UpstreamNotFound(_)
                | Self::NoMatchingTags { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub task_id: TaskId,
    pub tags: Vec<String>,
}

#[derive(Clone)]
pub struct SubscriptionReconciler<R: RendezvousStore, K: Clock> {
    store: Store,
    router: TunnelRouter<R>,
    tasks: TaskService<K>,
    clock: K,
    /// Agent that runs searches; `None` picks any connected agent.
    search_agent: Option<String>,
}

impl<R: RendezvousStore, K: Clock> SubscriptionReconciler<R, K> {
    pub fn new(store: Store, router: TunnelRouter<R>, clock: K, search_agent: Option<String>) -> Self {
        let tasks = TaskService::new(store.clone(), clock.clone());
        Self { store, router, tasks, clock, search_agent }
    }

    /// Run one cycle for `id` and record its outcome on the subscription.
    pub async fn sync(&self, id: SubscriptionId) -> Result<SyncOutcome, SubscriptionError> {
        let subscription = self.store.subscription(id)?;
        if !subscription.enable {
            return Err(SubscriptionError::Disabled(id));
        }

        match self.cycle(&subscription).await {
            Ok(outcome) => {
                self.succeeded(&subscription, &outcome);
                Ok(outcome)
            }
            Err(e) if e.is_terminal() => {
                self.disable(id, &e)?;
                Err(e)
            }
            Err(e) => {
                self.failed(id, &e)?;
                Err(e)
            }
        }
    }

    async fn cycle(&self, subscription: &Subscription) -> Result<SyncOutcome, SubscriptionError> {
        let path = subscription.repository()?;
        let size = subscription.page_size();
        TagPolicy::parse(&subscription.policy).map_err(|e| SubscriptionError::InvalidPolicy {
            policy: subscription.policy.clone(),
            reason: e.to_string(),
        })?;

        let source = subscription.source.clone().map_or(SearchSource::All, SearchSource::Named);
        let command = Command::SearchTags {
            source,
            namespace: path.namespace.clone(),
            repository: path.repository.clone(),
            policy: subscription.policy.clone(),
            size,
        };
        let value = match self.router.call(self.search_agent.as_deref(), command).await {
            Ok(value) => value,
            Err(e) if e.is_not_found() => {
                return Err(SubscriptionError::UpstreamNotFound(path.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut tags: Vec<String> = serde_json::from_value(value)?;
        if tags.is_empty() {
            return Err(SubscriptionError::NoMatchingTags {
                path: path.to_string(),
                policy: subscription.policy.clone(),
            });
        }
        let excess = tags.len().saturating_sub(size as usize);
        tags.drain(..excess);

        let raw_path = subscription.raw_path.trim().trim_matches('/');
        let images: Vec<String> = tags.iter().map(|tag| format!("{raw_path}:{tag}")).collect();
        let (task, _) = self.tasks.create_task(
            subscription.registry_id,
            &subscription.agent_name,
            &images,
            OwnerRef::Subscription,
            Some(subscription.id),
        )?;
        Ok(SyncOutcome { task_id: task.id, tags })
    }

    fn succeeded(&self, subscription: &Subscription, outcome: &SyncOutcome) {
        let now = self.clock.epoch_ms();
        let id = subscription.id;
        self.store.append_message(
            id,
            MessageLevel::Info,
            format!("created task {} for tags {}", outcome.task_id, outcome.tags.join(", ")),
            now,
        );
        // Written against the version read at the start of the cycle. If the
        // row moved on meanwhile, the newer write wins and this one is dropped.
        match self.store.update_subscription(id, subscription.resource_version, |row| {
            row.last_notify_ms = Some(now);
            row.fail_times = 0;
        }) {
            Ok(_) => {}
            Err(e) if e.is_conflict() => debug!(subscription_id = %id, "stale notify time dropped"),
            Err(e) => warn!(subscription_id = %id, error = %e, "could not record sync"),
        }
        info!(subscription_id = %id, task_id = %outcome.task_id, tags = outcome.tags.len(), "subscription synced");
    }

    fn disable(&self, id: SubscriptionId, error: &SubscriptionError) -> Result<(), StoreError> {
        let message = format!("{error}; subscription disabled");
        self.store.append_message(id, MessageLevel::Error, &message, self.clock.epoch_ms());
        retry_conflicts(|| {
            let current = self.store.subscription(id)?;
            self.store.update_subscription(id, current.resource_version, |row| row.enable = false)
        })?;
        warn!(subscription_id = %id, error = %error, "subscription disabled");
        Ok(())
    }

    fn failed(&self, id: SubscriptionId, error: &SubscriptionError) -> Result<(), StoreError> {
        self.store.append_message(
            id,
            MessageLevel::Error,
            format!("sync failed: {error}"),
            self.clock.epoch_ms(),
        );
        let updated = retry_conflicts(|| {
            let current = self.store.subscription(id)?;
            self.store.update_subscription(id, current.resource_version, |row| {
                row.fail_times = row.fail_times.saturating_add(1)
            })
        })?;
        warn!(subscription_id = %id, fail_times = updated.fail_times, error = %error, "subscription sync failed");
        Ok(())
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod tests;
