// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker that runs inside each agent container.

mod executor;
mod pickup;

pub use executor::{ReportClosed, StatusReporter, SyncExecutor, SyncSummary};
pub use pickup::{run_jobs, JobPickup, PickupError, BRANCH_PREFIX};

#[cfg(any(test, feature = "test-support"))]
pub use executor::RecordingReporter;
