// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! hm-daemon: process wiring for the control plane (`hmd`) and the agent
//! worker (`hm-agent`).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod env;
pub mod lifecycle;
pub mod logging;
pub mod rendezvous;
pub mod worker;

pub use config::{ConfigError, DaemonConfig};
pub use lifecycle::{startup, Daemon, LifecycleError, Services};
pub use worker::{load_agent_config, run_agent, WorkerError};
