// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Standing subscriptions: search upstream for new tags and turn them into
//! sync tasks.

mod policy;
mod reconciler;
mod scheduler;
mod service;

pub use policy::TagPolicy;
pub use reconciler::{SubscriptionError, SubscriptionReconciler, SyncOutcome};
pub use scheduler::{backoff_delay, SchedulerHandle, SchedulerSettings, SubscriptionScheduler};
pub use service::SubscriptionService;
