// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hm-core: entity types shared by the hm control plane and its agents

pub mod macros;

pub mod agent;
pub mod clock;
pub mod host;
pub mod id;
pub mod registry;
pub mod subscription;
pub mod task;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use agent::{AccountCredentials, Agent, AgentStatus};
pub use clock::{Clock, FakeClock, SystemClock};
pub use host::{HostController, HostStatus};
pub use id::{
    AgentId, CorrelationId, HostId, ImageId, MessageId, RegistryId, SubscriptionId, TaskId,
};
pub use registry::{mirror_reference, Registry};
pub use subscription::{
    MessageLevel, RepositoryPath, Subscription, SubscriptionMessage, MAX_PAGE_SIZE,
};
pub use task::{Image, ImageStatus, OwnerRef, Task, TaskStatus};
