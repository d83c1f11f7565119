// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tunnel wire contract between the control plane and its agents.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.
//!
//! Agents open the connection and send [`ClientFrame`]s: the first one
//! registers the agent's identity, later ones carry status reports. The server
//! only ever pushes [`PushFrame`]s, whose `result` bytes hold a
//! [`CallEnvelope`]. Replies to pushed commands do not come back on the stream;
//! the agent writes a [`CallResult`] to the rendezvous store under
//! [`rendezvous_key`].

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod agent_config;
mod call;
mod frame;
mod job;
mod report;
mod wire;

pub use agent_config::{AgentConfig, UpstreamRegistry};
pub use call::{
    rendezvous_key, CallEnvelope, CallOutcome, CallResult, Command, RemoteErrorKind, SearchSource,
    CHANGE_TOPIC,
};
pub use frame::{ClientFrame, ClientPayload, PushFrame};
pub use job::{JobImage, JobRegistry, JobSpec};
pub use report::{AgentReport, ImageReport, TaskReport};
pub use wire::{
    decode, encode, read_frame, read_message, write_frame, write_message, ProtocolError,
    MAX_FRAME_LEN,
};
