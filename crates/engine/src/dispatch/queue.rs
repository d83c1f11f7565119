// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deduplicating work queue with per-item retry backoff.
//!
//! An item is never handed to two workers at once: adding an item that is
//! being processed marks it dirty, and `done` requeues it. Items waiting out
//! a backoff ignore plain `add`s until the delay elapses.

use super::retry::RetryPolicy;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter<T> {
    pub item: T,
    pub error: String,
}

struct QueueState<T> {
    queue: VecDeque<T>,
    dirty: HashSet<T>,
    processing: HashSet<T>,
    delayed: HashSet<T>,
    failures: HashMap<T, u32>,
    dead: Vec<DeadLetter<T>>,
    shutting_down: bool,
}

impl<T> Default for QueueState<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            dirty: HashSet::new(),
            processing: HashSet::new(),
            delayed: HashSet::new(),
            failures: HashMap::new(),
            dead: Vec::new(),
            shutting_down: false,
        }
    }
}

#[derive(Clone)]
pub struct WorkQueue<T> {
    name: Arc<str>,
    policy: RetryPolicy,
    state: Arc<Mutex<QueueState<T>>>,
    notify: Arc<Notify>,
}

impl<T> WorkQueue<T>
where
    T: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    pub fn new(name: &str, policy: RetryPolicy) -> Self {
        Self {
            name: Arc::from(name),
            policy,
            state: Arc::new(Mutex::new(QueueState::default())),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&self, item: T) {
        let mut state = self.state.lock();
        if state.shutting_down || state.delayed.contains(&item) || state.dirty.contains(&item) {
            return;
        }
        state.dirty.insert(item.clone());
        if !state.processing.contains(&item) {
            state.queue.push_back(item);
            self.notify.notify_one();
        }
    }

    /// Add `item` once `delay` has passed.
    pub fn add_after(&self, item: T, delay: Duration) {
        {
            let mut state = self.state.lock();
            if state.shutting_down || !state.delayed.insert(item.clone()) {
                return;
            }
            state.dirty.remove(&item);
        }
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.state.lock().delayed.remove(&item);
            queue.add(item);
        });
    }

    /// Next item, or `None` once the queue is shut down.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    if !state.queue.is_empty() {
                        self.notify.notify_one();
                    }
                    return Some(item);
                }
            }
            notified.await;
        }
    }

    /// Finish processing `item`, requeueing it if it was added meanwhile.
    pub fn done(&self, item: &T) {
        let mut state = self.state.lock();
        state.processing.remove(item);
        if state.dirty.contains(item) && !state.shutting_down {
            state.queue.push_back(item.clone());
            self.notify.notify_one();
        }
    }

    /// Count a failure and schedule a retry with backoff.
    ///
    /// Returns `false` when the attempt budget is spent; the caller should
    /// dead-letter the item.
    pub fn retry(&self, item: T) -> bool {
        let failures = {
            let mut state = self.state.lock();
            let failures = state.failures.entry(item.clone()).or_insert(0);
            *failures += 1;
            *failures
        };
        if self.policy.exhausted(failures) {
            return false;
        }
        let delay = self.policy.delay(failures - 1);
        tracing::debug!(queue = %self.name, ?item, failures, ?delay, "retry scheduled");
        self.add_after(item, delay);
        true
    }

    pub fn failures(&self, item: &T) -> u32 {
        self.state.lock().failures.get(item).copied().unwrap_or(0)
    }

    /// Clear the failure count of `item`.
    pub fn forget(&self, item: &T) {
        self.state.lock().failures.remove(item);
    }

    pub fn dead_letter(&self, item: T, error: impl Into<String>) {
        let mut state = self.state.lock();
        state.failures.remove(&item);
        state.dirty.remove(&item);
        state.dead.push(DeadLetter { item, error: error.into() });
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter<T>> {
        self.state.lock().dead.clone()
    }

    /// Items waiting for a worker.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wake every waiting `get` with `None` and stop accepting items.
    pub fn shutdown(&self) {
        self.state.lock().shutting_down = true;
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
