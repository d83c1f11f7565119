// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hm-storage: the desired-state store.
//!
//! Every entity carries a `resource_version`. Writes name the version they were
//! computed from and are rejected with [`StoreError::VersionConflict`] when the
//! stored row has moved on, so concurrent reconciliations cannot lose updates.

mod error;
mod snapshot;
mod store;
mod tables;

pub use error::{EntityKind, StoreError};
pub use snapshot::{Snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
pub use store::{Change, Store};
pub use tables::Tables;
