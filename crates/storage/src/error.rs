// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Agent,
    Host,
    Registry,
    Task,
    Image,
    Subscription,
}

hm_core::simple_display! {
    EntityKind {
        Agent => "agent",
        Host => "host controller",
        Registry => "registry",
        Task => "task",
        Image => "image",
        Subscription => "subscription",
    }
}

/// Outcome of a rejected store operation.
///
/// A `VersionConflict` means the row exists but changed underneath the
/// caller, who must re-read before trying again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: u64 },

    #[error("stale write to {kind} {id}: expected version {expected}, stored version is {actual}")]
    VersionConflict { kind: EntityKind, id: u64, expected: u64, actual: u64 },

    #[error("invalid {kind}: {reason}")]
    Validation { kind: EntityKind, reason: String },

    #[error("{kind} {name:?} already exists")]
    Duplicate { kind: EntityKind, name: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    pub(crate) fn invalid(kind: EntityKind, reason: impl Into<String>) -> Self {
        Self::Validation { kind, reason: reason.into() }
    }
}
