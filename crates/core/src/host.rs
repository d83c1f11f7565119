// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Physical host running a host-controller.

use crate::id::HostId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Online,
    Offline,
}

crate::simple_display! {
    HostStatus {
        Online => "online",
        Offline => "offline",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostController {
    pub id: HostId,
    pub name: String,
    /// `user@host[:port]` the remote shell connects to.
    pub address: String,
    pub status: HostStatus,
    pub resource_version: u64,
}

impl HostController {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: HostId::default(),
            name: name.into(),
            address: address.into(),
            status: HostStatus::Online,
            resource_version: 0,
        }
    }
}
