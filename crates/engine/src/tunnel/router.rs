// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sending commands to agents and collecting their results.

use super::registry::{StreamHandle, TunnelRegistry};
use hm_adapters::{RendezvousError, RendezvousStore};
use hm_core::CorrelationId;
use hm_wire::{
    decode, rendezvous_key, CallEnvelope, CallOutcome, CallResult, Command, ProtocolError,
    PushFrame, RemoteErrorKind,
};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("agent {0} is not connected")]
    NotConnected(String),
    #[error("no agents connected")]
    NoClients,
    #[error("{command} on {identity} timed out after {timeout:?}")]
    Timeout { identity: String, command: &'static str, timeout: Duration },
    #[error("{command} on {identity} failed ({kind:?}): {message}")]
    Remote { identity: String, command: &'static str, kind: RemoteErrorKind, message: String },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Rendezvous(#[from] RendezvousError),
}

impl TunnelError {
    /// The agent answered that the upstream repository does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Remote { kind: RemoteErrorKind::NotFound, .. })
    }
}

/// Routes commands to registered agents.
#[derive(Clone)]
pub struct TunnelRouter<R: RendezvousStore> {
    registry: TunnelRegistry,
    rendezvous: R,
    timeout: Duration,
}

impl<R: RendezvousStore> TunnelRouter<R> {
    pub fn new(registry: TunnelRegistry, rendezvous: R, timeout: Duration) -> Self {
        Self { registry, rendezvous, timeout }
    }

    pub fn registry(&self) -> &TunnelRegistry {
        &self.registry
    }

    /// Push `envelope` to `identity`, or to a random agent when `None`.
    ///
    /// Returns the identity the envelope went to. A stream whose connection
    /// is gone fails here and is evicted. A stream whose buffer stays full
    /// for the router timeout fails with [`TunnelError::Timeout`].
    pub async fn dispatch(
        &self,
        identity: Option<&str>,
        envelope: &CallEnvelope,
    ) -> Result<String, TunnelError> {
        self.dispatch_until(identity, envelope, Instant::now() + self.timeout).await
    }

    async fn dispatch_until(
        &self,
        identity: Option<&str>,
        envelope: &CallEnvelope,
        deadline: Instant,
    ) -> Result<String, TunnelError> {
        let (identity, handle) = self.resolve(identity)?;
        let frame = PushFrame::wrap(envelope)?;
        match tokio::time::timeout_at(deadline, handle.tx.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                self.registry.evict(&identity, handle.generation);
                warn!(identity, "push stream closed, agent evicted");
                return Err(TunnelError::NotConnected(identity));
            }
            Err(_) => {
                warn!(identity, "push stream stalled");
                return Err(TunnelError::Timeout {
                    identity,
                    command: envelope.command.name(),
                    timeout: self.timeout,
                });
            }
        }
        debug!(
            identity,
            correlation_id = %envelope.correlation_id,
            command = envelope.command.name(),
            "command pushed"
        );
        Ok(identity)
    }

    fn resolve(&self, identity: Option<&str>) -> Result<(String, StreamHandle), TunnelError> {
        match identity {
            Some(identity) => self
                .registry
                .lookup(identity)
                .map(|h| (identity.to_string(), h))
                .ok_or_else(|| TunnelError::NotConnected(identity.to_string())),
            None => self.registry.pick().ok_or(TunnelError::NoClients),
        }
    }

    /// Dispatch `command` and wait for the agent's result.
    pub async fn call(
        &self,
        identity: Option<&str>,
        command: Command,
    ) -> Result<serde_json::Value, TunnelError> {
        let envelope = CallEnvelope { correlation_id: CorrelationId::new(), command };
        let name = envelope.command.name();
        let key = rendezvous_key(&envelope.correlation_id);
        // One deadline covers the push and the wait for the result.
        let deadline = Instant::now() + self.timeout;
        let identity = self.dispatch_until(identity, &envelope, deadline).await?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        let bytes = match self.rendezvous.wait(&key, remaining).await {
            Ok(bytes) => bytes,
            Err(RendezvousError::Timeout { .. }) => {
                return Err(TunnelError::Timeout { identity, command: name, timeout: self.timeout })
            }
            Err(e) => return Err(e.into()),
        };

        let result: CallResult = decode(&bytes)?;
        if result.correlation_id != envelope.correlation_id {
            return Err(ProtocolError::Unexpected(format!(
                "result for {} under key of {}",
                result.correlation_id, envelope.correlation_id
            ))
            .into());
        }
        match result.outcome {
            CallOutcome::Ok { value } => Ok(value),
            CallOutcome::Err { kind, message } => {
                Err(TunnelError::Remote { identity, command: name, kind, message })
            }
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
