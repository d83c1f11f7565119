// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row storage behind [`crate::Store`].

use crate::error::{EntityKind, StoreError};
use hm_core::{Agent, HostController, Image, Registry, Subscription, SubscriptionMessage, Task};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All persisted rows, keyed by row id.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tables {
    #[serde(default)]
    pub agents: BTreeMap<u64, Agent>,
    #[serde(default)]
    pub hosts: BTreeMap<u64, HostController>,
    #[serde(default)]
    pub registries: BTreeMap<u64, Registry>,
    #[serde(default)]
    pub tasks: BTreeMap<u64, Task>,
    #[serde(default)]
    pub images: BTreeMap<u64, Image>,
    #[serde(default)]
    pub subscriptions: BTreeMap<u64, Subscription>,
    #[serde(default)]
    pub messages: BTreeMap<u64, SubscriptionMessage>,
    /// Last id handed out. Shared by every table.
    #[serde(default)]
    pub last_id: u64,
}

impl Tables {
    pub(crate) fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }
}

pub(crate) trait Versioned: Clone {
    const KIND: EntityKind;

    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);

    /// Soft-deleted rows behave as absent.
    fn is_hidden(&self) -> bool {
        false
    }
}

macro_rules! versioned {
    ($ty:ty, $kind:ident) => {
        impl Versioned for $ty {
            const KIND: EntityKind = EntityKind::$kind;

            fn version(&self) -> u64 {
                self.resource_version
            }

            fn set_version(&mut self, version: u64) {
                self.resource_version = version;
            }
        }
    };
    ($ty:ty, $kind:ident, hidden) => {
        impl Versioned for $ty {
            const KIND: EntityKind = EntityKind::$kind;

            fn version(&self) -> u64 {
                self.resource_version
            }

            fn set_version(&mut self, version: u64) {
                self.resource_version = version;
            }

            fn is_hidden(&self) -> bool {
                self.deleted
            }
        }
    };
}

versioned!(Agent, Agent);
versioned!(HostController, Host);
versioned!(Registry, Registry);
versioned!(Subscription, Subscription);
versioned!(Task, Task, hidden);
versioned!(Image, Image, hidden);

pub(crate) fn visible<T: Versioned>(table: &BTreeMap<u64, T>, id: u64) -> Result<&T, StoreError> {
    table
        .get(&id)
        .filter(|row| !row.is_hidden())
        .ok_or(StoreError::NotFound { kind: T::KIND, id })
}

/// Apply `patch` if the stored version still equals `expected`, then bump it by one.
pub(crate) fn versioned_update<T: Versioned>(
    table: &mut BTreeMap<u64, T>,
    id: u64,
    expected: u64,
    patch: impl FnOnce(&mut T),
) -> Result<T, StoreError> {
    let row = table
        .get_mut(&id)
        .filter(|row| !row.is_hidden())
        .ok_or(StoreError::NotFound { kind: T::KIND, id })?;
    let actual = row.version();
    if actual != expected {
        return Err(StoreError::VersionConflict { kind: T::KIND, id, expected, actual });
    }
    let mut next = row.clone();
    patch(&mut next);
    next.set_version(actual + 1);
    *row = next.clone();
    Ok(next)
}
