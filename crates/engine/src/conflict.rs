// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use hm_storage::StoreError;

/// Re-reads allowed when a concurrent writer bumps the row version.
const CONFLICT_RETRIES: usize = 3;

/// Run `attempt` again while it fails with a version conflict.
///
/// `attempt` must re-read the row it writes, so every try carries the
/// current version.
pub(crate) fn retry_conflicts<T>(
    mut attempt: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let mut tries = 0;
    loop {
        match attempt() {
            Err(e) if e.is_conflict() && tries < CONFLICT_RETRIES => tries += 1,
            other => return other,
        }
    }
}
