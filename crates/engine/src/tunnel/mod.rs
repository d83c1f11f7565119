// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reverse tunnel between the control plane and its agents.
//!
//! Agents dial in and register an identity; the control plane then pushes
//! [`CallEnvelope`](hm_wire::CallEnvelope)s down that stream. Results never
//! come back on the stream: the agent writes them into the rendezvous store
//! under a key derived from the correlation id, and the caller waits there.

mod client;
mod registry;
mod responder;
mod router;
mod server;

pub use client::{TunnelClient, TunnelReporter};
pub use registry::{StreamHandle, TunnelRegistry};
pub use responder::CommandResponder;
pub use router::{TunnelError, TunnelRouter};
pub use server::{ReportHandler, TunnelServer};
