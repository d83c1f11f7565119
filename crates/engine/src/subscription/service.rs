// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-facing subscription operations.

use super::policy::TagPolicy;
use super::reconciler::SubscriptionError;
use crate::conflict::retry_conflicts;
use hm_core::{Clock, MessageLevel, Subscription, SubscriptionId, SubscriptionMessage};
use hm_storage::Store;
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct SubscriptionService<K: Clock> {
    store: Store,
    clock: K,
}

impl<K: Clock> SubscriptionService<K> {
    pub fn new(store: Store, clock: K) -> Self {
        Self { store, clock }
    }

    /// Validate and store a new subscription.
    pub fn create(&self, subscription: Subscription) -> Result<Subscription, SubscriptionError> {
        TagPolicy::parse(&subscription.policy).map_err(|e| SubscriptionError::InvalidPolicy {
            policy: subscription.policy.clone(),
            reason: e.to_string(),
        })?;
        let created = self.store.insert_subscription(subscription, self.clock.epoch_ms())?;
        info!(subscription_id = %created.id, path = %created.path, "subscription created");
        Ok(created)
    }

    /// Turn a subscription back on and forget its failures.
    pub fn enable(&self, id: SubscriptionId) -> Result<Subscription, SubscriptionError> {
        let updated = retry_conflicts(|| {
            let current = self.store.subscription(id)?;
            self.store.update_subscription(id, current.resource_version, |row| {
                row.enable = true;
                row.fail_times = 0;
            })
        })?;
        self.store.append_message(id, MessageLevel::Info, "subscription enabled", self.clock.epoch_ms());
        info!(subscription_id = %id, "subscription enabled");
        Ok(updated)
    }

    pub fn disable(&self, id: SubscriptionId) -> Result<Subscription, SubscriptionError> {
        let updated = retry_conflicts(|| {
            let current = self.store.subscription(id)?;
            self.store.update_subscription(id, current.resource_version, |row| row.enable = false)
        })?;
        self.store.append_message(id, MessageLevel::Info, "subscription disabled", self.clock.epoch_ms());
        info!(subscription_id = %id, "subscription disabled");
        Ok(updated)
    }

    pub fn messages(&self, id: SubscriptionId) -> Vec<SubscriptionMessage> {
        self.store.messages_for(id)
    }

    /// Drop messages older than `retention`. Returns how many were removed.
    pub fn purge_messages(&self, retention: Duration) -> usize {
        let retention_ms = u64::try_from(retention.as_millis()).unwrap_or(u64::MAX);
        let cutoff = self.clock.epoch_ms().saturating_sub(retention_ms);
        self.store.purge_messages_before(cutoff)
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
