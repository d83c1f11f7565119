// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Helpers shared by this crate's async tests.

use crate::tunnel::{CommandResponder, TunnelRouter};
use hm_adapters::{FakeRegistryBackend, MemoryRendezvous};
use hm_wire::PushFrame;
use std::time::Duration;
use tokio::sync::mpsc;

/// Poll `check` every 10ms for up to five seconds.
pub(crate) async fn until(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}

/// Register `identity` with `router` and answer everything pushed to it
/// with `responder`, the way a connected agent would.
pub(crate) fn connect_agent(
    router: &TunnelRouter<MemoryRendezvous>,
    identity: &str,
    responder: CommandResponder<FakeRegistryBackend, MemoryRendezvous>,
) {
    let (tx, mut rx) = mpsc::channel::<PushFrame>(16);
    router.registry().register(identity, tx);
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            responder.handle_frame(frame).await;
        }
    });
}
