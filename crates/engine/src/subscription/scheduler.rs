// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runs subscription cycles on their interval, backing off after failures.

use super::reconciler::{SubscriptionError, SubscriptionReconciler};
use hm_adapters::RendezvousStore;
use hm_core::{Clock, Subscription, SubscriptionId};
use hm_storage::{Change, Store};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const RUN_NOW_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// How often due subscriptions are looked for.
    pub tick: Duration,
    /// Longest delay a failing subscription is backed off to.
    pub backoff_cap: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self { tick: Duration::from_secs(1), backoff_cap: Duration::from_secs(3600) }
    }
}

/// Delay before the next run: `interval * 2^fail_times`, never more than
/// `cap` (or `interval`, if that is longer).
pub fn backoff_delay(interval: Duration, fail_times: u32, cap: Duration) -> Duration {
    let factor = 1u32.checked_shl(fail_times).unwrap_or(u32::MAX);
    interval.saturating_mul(factor).min(cap.max(interval))
}

/// Asks a running scheduler to sync a subscription immediately.
///
/// The scheduler also runs a subscription as soon as a store write enables
/// it, so callers going through the store do not need a handle.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SubscriptionId>,
}

impl SchedulerHandle {
    /// Returns `false` if the scheduler has stopped or is saturated.
    pub fn run_now(&self, id: SubscriptionId) -> bool {
        self.tx.try_send(id).is_ok()
    }
}

pub struct SubscriptionScheduler<R: RendezvousStore, K: Clock> {
    reconciler: SubscriptionReconciler<R, K>,
    store: Store,
    clock: K,
    settings: SchedulerSettings,
    requests: mpsc::Receiver<SubscriptionId>,
    /// Wall-clock ms of each subscription's last run since startup.
    last_run: HashMap<SubscriptionId, u64>,
    in_flight: Arc<Mutex<HashSet<SubscriptionId>>>,
}

impl<R: RendezvousStore, K: Clock> SubscriptionScheduler<R, K> {
    pub fn new(
        reconciler: SubscriptionReconciler<R, K>,
        store: Store,
        clock: K,
        settings: SchedulerSettings,
    ) -> (Self, SchedulerHandle) {
        let (tx, requests) = mpsc::channel(RUN_NOW_BUFFER);
        let scheduler = Self {
            reconciler,
            store,
            clock,
            settings,
            requests,
            last_run: HashMap::new(),
            in_flight: Arc::default(),
        };
        (scheduler, SchedulerHandle { tx })
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(tick = ?self.settings.tick, "subscription scheduler started");
        let mut changes = self.store.subscribe();
        let mut enabled: HashSet<SubscriptionId> =
            self.store.list_subscriptions().into_iter().filter(|s| s.enable).map(|s| s.id).collect();
        let mut cycles = JoinSet::new();
        let mut tick = tokio::time::interval(self.settings.tick);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    for id in self.due() {
                        self.start(id, &mut cycles);
                    }
                }
                Some(id) = self.requests.recv() => {
                    debug!(subscription_id = %id, "run requested");
                    self.start(id, &mut cycles);
                }
                change = changes.recv() => match change {
                    Ok(Change::Subscription { id }) => {
                        if self.became_enabled(id, &mut enabled) {
                            debug!(subscription_id = %id, "subscription enabled, running now");
                            self.start(id, &mut cycles);
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "missed store changes");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(_) = cycles.join_next(), if !cycles.is_empty() => {}
            }
        }

        while cycles.join_next().await.is_some() {}
        info!("subscription scheduler stopped");
    }

    /// Track `id` in `enabled`; true only when it just went from disabled
    /// (or absent) to enabled.
    fn became_enabled(&self, id: SubscriptionId, enabled: &mut HashSet<SubscriptionId>) -> bool {
        match self.store.subscription(id) {
            Ok(sub) if sub.enable => enabled.insert(id),
            _ => {
                enabled.remove(&id);
                false
            }
        }
    }

    /// Enabled subscriptions whose next run time has passed.
    fn due(&self) -> Vec<SubscriptionId> {
        let now = self.clock.epoch_ms();
        self.store
            .list_subscriptions()
            .into_iter()
            .filter(|s| s.enable)
            .filter(|s| next_run_ms(s, self.last_run.get(&s.id).copied(), self.settings.backoff_cap) <= now)
            .map(|s| s.id)
            .collect()
    }

    fn start(&mut self, id: SubscriptionId, cycles: &mut JoinSet<()>) {
        if !self.in_flight.lock().insert(id) {
            debug!(subscription_id = %id, "cycle already running");
            return;
        }
        self.last_run.insert(id, self.clock.epoch_ms());
        let reconciler = self.reconciler.clone();
        let in_flight = Arc::clone(&self.in_flight);
        cycles.spawn(async move {
            match reconciler.sync(id).await {
                Ok(_) | Err(SubscriptionError::Disabled(_)) => {}
                // The reconciler already recorded the failure on the subscription.
                Err(e) => debug!(subscription_id = %id, error = %e, "cycle failed"),
            }
            in_flight.lock().remove(&id);
        });
    }
}

/// When `subscription` should run next. Without a run since startup, the
/// last successful notify stands in; a subscription that never ran is due
/// immediately.
fn next_run_ms(subscription: &Subscription, last_run: Option<u64>, cap: Duration) -> u64 {
    let Some(last) = last_run.or(subscription.last_notify_ms) else {
        return 0;
    };
    let interval = Duration::from_secs(subscription.interval_secs);
    let delay = backoff_delay(interval, subscription.fail_times, cap);
    last.saturating_add(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
