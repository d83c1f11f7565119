// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

/// Config file path from `HM_CONFIG`.
pub fn config_path() -> Option<PathBuf> {
    non_empty("HM_CONFIG").map(PathBuf::from)
}

/// State directory override from `HM_STATE_DIR`.
pub fn state_dir() -> Option<PathBuf> {
    non_empty("HM_STATE_DIR").map(PathBuf::from)
}

/// Default state directory: XDG state dir/hm > ~/.local/state/hm > /var/lib/hm
pub fn default_state_dir() -> PathBuf {
    if let Some(xdg) = non_empty("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("hm");
    }
    dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/state")))
        .map(|dir| dir.join("hm"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/hm"))
}

/// Tunnel listen address from `HM_TUNNEL_BIND`.
pub fn tunnel_bind() -> Option<String> {
    non_empty("HM_TUNNEL_BIND")
}

/// Redis URL from `HM_REDIS_URL`. Setting it selects the Redis rendezvous.
pub fn redis_url() -> Option<String> {
    non_empty("HM_REDIS_URL")
}

/// Log directory from `HM_LOG_DIR`.
pub fn log_dir() -> Option<PathBuf> {
    non_empty("HM_LOG_DIR").map(PathBuf::from)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
