// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hm-engine: the control loops.
//!
//! - [`fleet`] drives agent containers on host controllers toward the status
//!   recorded in the store.
//! - [`dispatch`] turns pending tasks into job projects the agents pick up.
//! - [`tunnel`] keeps one push stream per connected agent and correlates the
//!   results agents write back through the rendezvous store.
//! - [`subscription`] polls upstream repositories through the tunnel and
//!   creates tasks for new tags.
//! - [`agent`] is the worker side: it executes jobs and answers tunnel calls.

pub mod agent;
pub mod dispatch;
pub mod fleet;
pub mod subscription;
pub mod tunnel;

mod conflict;

#[cfg(test)]
mod test_util;

pub use agent::{run_jobs, JobPickup, ReportClosed, StatusReporter, SyncExecutor, SyncSummary};
pub use dispatch::{
    DispatchError, DispatchSettings, RetryPolicy, TaskCallbacks, TaskDispatcher, TaskError,
    TaskService, WorkQueue,
};
pub use fleet::{
    AgentService, FleetReconciler, FleetSettings, HostLoop, HostLoopSettings, Outcome,
    ReconcileError, StatusError,
};
pub use subscription::{
    SchedulerHandle, SchedulerSettings, SubscriptionError, SubscriptionReconciler,
    SubscriptionScheduler, SubscriptionService, SyncOutcome, TagPolicy,
};
pub use tunnel::{
    CommandResponder, ReportHandler, TunnelClient, TunnelError, TunnelRegistry, TunnelReporter,
    TunnelRouter, TunnelServer,
};
