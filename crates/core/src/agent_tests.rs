// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    starting = { AgentStatus::Starting, true },
    stopping = { AgentStatus::Stopping, true },
    restarting = { AgentStatus::Restarting, true },
    upgrading = { AgentStatus::Upgrading, true },
    deleting = { AgentStatus::Deleting, true },
    running = { AgentStatus::Running, false },
    stopped = { AgentStatus::Stopped, false },
    offline = { AgentStatus::Offline, false },
    error = { AgentStatus::Error, false },
    not_started = { AgentStatus::NotStarted, false },
)]
fn transient_states(status: AgentStatus, transient: bool) {
    assert_eq!(status.is_transient(), transient);
}

#[test]
fn offline_is_requestable_but_not_transient() {
    assert!(AgentStatus::Offline.is_requestable());
    assert!(!AgentStatus::Running.is_requestable());
    assert!(!AgentStatus::Unrecognized("x".into()).is_requestable());
}

#[parameterized(
    running = { "Running", AgentStatus::Running },
    unknown_alias = { "Unknown", AgentStatus::NotStarted },
    empty = { "", AgentStatus::NotStarted },
    frobnicate = { "frobnicate", AgentStatus::Unrecognized("frobnicate".into()) },
)]
fn parse_status(raw: &str, expected: AgentStatus) {
    assert_eq!(AgentStatus::from(raw), expected);
}

#[test]
fn unrecognized_status_round_trips_verbatim() {
    let agent = Agent::builder()
        .status(AgentStatus::Unrecognized("frobnicate".into()))
        .build();
    let json = serde_json::to_string(&agent).unwrap();
    assert!(json.contains("\"status\":\"frobnicate\""));

    let back: Agent = serde_json::from_str(&json).unwrap();
    assert_eq!(back.status, AgentStatus::Unrecognized("frobnicate".into()));
}

#[test]
fn new_agent_is_not_started() {
    let agent = Agent::new("mirror-a");
    assert_eq!(agent.status, AgentStatus::NotStarted);
    assert_eq!(agent.resource_version, 0);
    assert!(agent.host.is_none());
}
