// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::call::CallEnvelope;
use crate::report::AgentReport;
use crate::wire::{decode, encode, ProtocolError};
use serde::{Deserialize, Serialize};

/// Agent → server frame. The first one on a connection registers `identity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    pub identity: String,
    pub payload: ClientPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientPayload {
    Hello {
        #[serde(default)]
        version: String,
    },
    Report(AgentReport),
}

impl ClientFrame {
    pub fn register(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            payload: ClientPayload::Hello { version: env!("CARGO_PKG_VERSION").to_string() },
        }
    }

    pub fn report(identity: impl Into<String>, report: AgentReport) -> Self {
        Self { identity: identity.into(), payload: ClientPayload::Report(report) }
    }
}

/// Server → agent frame. `result` is an encoded [`CallEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushFrame {
    pub result: Vec<u8>,
}

impl PushFrame {
    pub fn wrap(envelope: &CallEnvelope) -> Result<Self, ProtocolError> {
        Ok(Self { result: encode(envelope)? })
    }

    pub fn envelope(&self) -> Result<CallEnvelope, ProtocolError> {
        decode(&self.result)
    }
}
