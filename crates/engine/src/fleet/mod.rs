// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent containers on host controllers.

mod container;
mod host_loop;
mod reconciler;
mod service;
mod staging;

pub use container::{container_name, quote, Container, ContainerState};
pub use host_loop::{HostLoop, HostLoopSettings};
pub use reconciler::{FleetReconciler, Outcome, ReconcileError};
pub use service::{AgentService, StatusError};
pub use staging::{job_repository, FleetSettings};
