// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent side: executes pushed commands and writes results back.

use super::router::TunnelError;
use crate::subscription::TagPolicy;
use futures_util::future::try_join_all;
use hm_adapters::{RegistryBackend, RegistryError, RendezvousStore};
use hm_core::MAX_PAGE_SIZE;
use hm_wire::{
    encode, rendezvous_key, CallEnvelope, CallOutcome, CallResult, Command, PushFrame,
    RemoteErrorKind, SearchSource, CHANGE_TOPIC,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How long a result stays readable in the rendezvous store.
pub const RESULT_TTL: Duration = Duration::from_secs(30);

struct Failure {
    kind: RemoteErrorKind,
    message: String,
}

impl Failure {
    fn invalid(message: impl Into<String>) -> Self {
        Self { kind: RemoteErrorKind::Invalid, message: message.into() }
    }
}

impl From<RegistryError> for Failure {
    fn from(e: RegistryError) -> Self {
        let kind = match e {
            RegistryError::NotFound(_) => RemoteErrorKind::NotFound,
            RegistryError::Unauthorized(_) | RegistryError::Http(_) => RemoteErrorKind::Failed,
        };
        Self { kind, message: e.to_string() }
    }
}

/// Runs commands against the agent's configured registry backends.
#[derive(Clone)]
pub struct CommandResponder<B: RegistryBackend, R: RendezvousStore> {
    backends: Arc<Vec<B>>,
    rendezvous: R,
}

impl<B: RegistryBackend, R: RendezvousStore> CommandResponder<B, R> {
    pub fn new(backends: Vec<B>, rendezvous: R) -> Self {
        Self { backends: Arc::new(backends), rendezvous }
    }

    /// Decode and answer one pushed frame, logging any failure.
    pub async fn handle_frame(&self, frame: PushFrame) {
        let envelope = match frame.envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "undecodable push frame dropped");
                return;
            }
        };
        let correlation_id = envelope.correlation_id.clone();
        if let Err(e) = self.respond(envelope).await {
            warn!(%correlation_id, error = %e, "failed to write call result");
        }
    }

    /// Execute the command and store its result under the correlation key.
    pub async fn respond(&self, envelope: CallEnvelope) -> Result<(), TunnelError> {
        let command = envelope.command.name();
        let outcome = match self.execute(&envelope.command).await {
            Ok(value) => CallOutcome::Ok { value },
            Err(Failure { kind, message }) => CallOutcome::Err { kind, message },
        };
        debug!(correlation_id = %envelope.correlation_id, command, ?outcome, "command executed");

        let result = CallResult { correlation_id: envelope.correlation_id, outcome };
        let key = rendezvous_key(&result.correlation_id);
        self.rendezvous.set(&key, &encode(&result)?, RESULT_TTL).await?;
        self.rendezvous.publish(CHANGE_TOPIC, &key).await?;
        Ok(())
    }

    async fn execute(&self, command: &Command) -> Result<serde_json::Value, Failure> {
        match command {
            Command::SearchTags { source, namespace, repository, policy, size } => {
                let policy = TagPolicy::parse(policy)
                    .map_err(|e| Failure::invalid(format!("invalid tag policy: {e}")))?;
                let tags = match source {
                    SearchSource::Named(name) => {
                        self.backend(name)?.list_tags(namespace, repository).await?
                    }
                    SearchSource::All => {
                        if self.backends.is_empty() {
                            return Err(Failure::invalid("no registry backends configured"));
                        }
                        search_all(&self.backends, namespace, repository).await?
                    }
                };
                let size = (*size as usize).min(MAX_PAGE_SIZE as usize);
                Ok(serde_json::Value::from(policy.select(tags, size)))
            }
            Command::CreateRepository { backend, namespace, repository } => {
                self.backend(backend)?.create_repository(namespace, repository).await?;
                Ok(serde_json::Value::Null)
            }
        }
    }

    fn backend(&self, name: &str) -> Result<&B, Failure> {
        self.backends
            .iter()
            .find(|b| b.name() == name)
            .ok_or_else(|| Failure::invalid(format!("unknown registry backend {name}")))
    }
}

/// Query every backend concurrently and merge their tags, first seen wins.
///
/// Any backend error fails the whole search.
async fn search_all<B: RegistryBackend>(
    backends: &[B],
    namespace: &str,
    repository: &str,
) -> Result<Vec<String>, RegistryError> {
    let lists = try_join_all(backends.iter().map(|b| b.list_tags(namespace, repository))).await?;
    let mut seen = HashSet::new();
    Ok(lists.into_iter().flatten().filter(|tag| seen.insert(tag.clone())).collect())
}

#[cfg(test)]
#[path = "responder_tests.rs"]
mod tests;
