// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use hm_storage::{Snapshot, SnapshotError, Store};
use std::path::PathBuf;

/// Capture the store and write it to `path` off the async runtime.
pub async fn checkpoint(store: &Store, path: PathBuf) -> Result<(), SnapshotError> {
    let snapshot = Snapshot::capture(store);
    match tokio::task::spawn_blocking(move || snapshot.save(&path)).await {
        Ok(result) => result,
        Err(e) => Err(SnapshotError::Io(std::io::Error::other(e))),
    }
}
