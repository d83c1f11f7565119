// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity → push stream map.

use hm_wire::PushFrame;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Sending half of one registered stream.
///
/// `generation` distinguishes a stream from a later registration under the
/// same identity, so a stale failure never evicts its replacement.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    pub generation: u64,
    pub tx: mpsc::Sender<PushFrame>,
}

#[derive(Clone, Default)]
pub struct TunnelRegistry {
    streams: Arc<RwLock<HashMap<String, StreamHandle>>>,
    generations: Arc<AtomicU64>,
}

impl TunnelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tx` for `identity`, replacing any earlier stream.
    pub fn register(&self, identity: &str, tx: mpsc::Sender<PushFrame>) -> u64 {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = self
            .streams
            .write()
            .insert(identity.to_string(), StreamHandle { generation, tx });
        if previous.is_some() {
            tracing::info!(identity, generation, "agent re-registered, replacing stream");
        } else {
            tracing::info!(identity, generation, "agent registered");
        }
        generation
    }

    pub fn lookup(&self, identity: &str) -> Option<StreamHandle> {
        self.streams.read().get(identity).cloned()
    }

    /// Uniformly random registered identity.
    pub fn pick(&self) -> Option<(String, StreamHandle)> {
        let streams = self.streams.read();
        let identities: Vec<&String> = streams.keys().collect();
        let identity = identities.choose(&mut rand::thread_rng())?;
        let handle = streams.get(*identity)?.clone();
        Some(((*identity).clone(), handle))
    }

    /// Remove `identity` only if it is still the stream of `generation`.
    pub fn evict(&self, identity: &str, generation: u64) -> bool {
        let mut streams = self.streams.write();
        if streams.get(identity).is_some_and(|h| h.generation == generation) {
            streams.remove(identity);
            tracing::info!(identity, generation, "agent stream evicted");
            true
        } else {
            false
        }
    }

    pub fn identities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.streams.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.streams.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
