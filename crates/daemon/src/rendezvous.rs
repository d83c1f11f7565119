// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rendezvous backend picked at startup.

use async_trait::async_trait;
use hm_adapters::{MemoryRendezvous, RedisRendezvous, RendezvousError, RendezvousStore};
use std::time::Duration;

/// Either backend behind one concrete type, so the engine is only
/// instantiated once.
#[derive(Clone)]
pub enum Rendezvous {
    Memory(MemoryRendezvous),
    Redis(RedisRendezvous),
}

impl Rendezvous {
    /// `memory` (or empty) selects the in-process store; anything else is
    /// taken as a Redis URL.
    pub async fn open(url: &str) -> Result<Self, RendezvousError> {
        match url.trim() {
            "" | "memory" => Ok(Self::Memory(MemoryRendezvous::new())),
            url => Ok(Self::Redis(RedisRendezvous::connect(url).await?)),
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Redis(_) => "redis",
        }
    }
}

#[async_trait]
impl RendezvousStore for Rendezvous {
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), RendezvousError> {
        match self {
            Self::Memory(store) => store.set(key, value, ttl).await,
            Self::Redis(store) => store.set(key, value, ttl).await,
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RendezvousError> {
        match self {
            Self::Memory(store) => store.get(key).await,
            Self::Redis(store) => store.get(key).await,
        }
    }

    async fn publish(&self, topic: &str, event: &str) -> Result<(), RendezvousError> {
        match self {
            Self::Memory(store) => store.publish(topic, event).await,
            Self::Redis(store) => store.publish(topic, event).await,
        }
    }

    async fn wait(&self, key: &str, timeout: Duration) -> Result<Vec<u8>, RendezvousError> {
        match self {
            Self::Memory(store) => store.wait(key, timeout).await,
            Self::Redis(store) => store.wait(key, timeout).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_url_selects_in_process_store() {
        for url in ["memory", "", " memory "] {
            let store = Rendezvous::open(url).await.unwrap();
            assert_eq!(store.backend(), "memory");
        }
    }

    #[tokio::test]
    async fn forwards_to_backend() {
        let store = Rendezvous::open("memory").await.unwrap();
        store.set("k", b"v", Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.wait("k", Duration::from_millis(10)).await.unwrap(), b"v".to_vec());
    }
}
