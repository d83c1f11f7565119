// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Commands pushed to agents and the results they leave in the rendezvous store.

use hm_core::CorrelationId;
use serde::{Deserialize, Serialize};

/// Topic a result key is published on once it has been written.
pub const CHANGE_TOPIC: &str = "hm:tunnel:results";

/// Store key an agent writes the result of call `id` under.
pub fn rendezvous_key(id: &CorrelationId) -> String {
    format!("hm:tunnel:result:{id}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEnvelope {
    pub correlation_id: CorrelationId,
    pub command: Command,
}

/// Which upstream backends a search covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum SearchSource {
    Named(String),
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Newest `size` tags of `namespace/repository` that match `policy`.
    SearchTags {
        source: SearchSource,
        namespace: String,
        repository: String,
        #[serde(default)]
        policy: String,
        size: u32,
    },
    CreateRepository {
        backend: String,
        namespace: String,
        repository: String,
    },
}

impl Command {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SearchTags { .. } => "search_tags",
            Self::CreateRepository { .. } => "create_repository",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// The upstream namespace or repository does not exist.
    NotFound,
    /// The command itself was malformed.
    Invalid,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallOutcome {
    Ok { value: serde_json::Value },
    Err { kind: RemoteErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub correlation_id: CorrelationId,
    pub outcome: CallOutcome,
}

impl CallResult {
    pub fn ok(correlation_id: CorrelationId, value: serde_json::Value) -> Self {
        Self { correlation_id, outcome: CallOutcome::Ok { value } }
    }

    pub fn err(correlation_id: CorrelationId, kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self { correlation_id, outcome: CallOutcome::Err { kind, message: message.into() } }
    }
}
