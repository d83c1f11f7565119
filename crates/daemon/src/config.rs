// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `hmd` configuration: a TOML file with every field defaulted, then
//! `HM_*` environment overrides.

use crate::env;
use hm_engine::{DispatchSettings, FleetSettings, HostLoopSettings, RetryPolicy, SchedulerSettings};
use hm_wire::UpstreamRegistry;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub state_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub store: StoreConfig,
    pub tunnel: TunnelConfig,
    pub rendezvous: RendezvousConfig,
    pub fleet: FleetConfig,
    pub dispatch: DispatchConfig,
    pub subscription: SubscriptionConfig,
    /// Rows created at startup when no row of the same name exists.
    #[serde(rename = "host")]
    pub hosts: Vec<HostSeed>,
    #[serde(rename = "registry")]
    pub registries: Vec<RegistrySeed>,
    #[serde(rename = "agent")]
    pub agents: Vec<AgentSeed>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Defaults to `<state_dir>/snapshot.json.zst`.
    pub snapshot_path: Option<PathBuf>,
    pub checkpoint_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { snapshot_path: None, checkpoint_interval_secs: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TunnelConfig {
    pub bind: String,
    /// Address agents dial; written into their staged config and jobs.
    pub advertise: String,
    /// How long a caller waits for an agent's result.
    pub call_timeout_secs: u64,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:7070".to_string(),
            advertise: "127.0.0.1:7070".to_string(),
            call_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendezvousBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendezvousConfig {
    pub backend: RendezvousBackend,
    pub url: String,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self { backend: RendezvousBackend::Memory, url: "redis://127.0.0.1:6379".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FleetConfig {
    pub resync_interval_secs: u64,
    pub max_failures: u32,
    pub retry_delay_secs: u64,
    pub image: String,
    pub work_root: String,
    pub worker_binary: PathBuf,
    pub job_template: PathBuf,
    /// `{agent}` is replaced by the agent name.
    pub job_repository: String,
    pub sync_concurrency: usize,
    pub owner: String,
    pub upstreams: Vec<UpstreamRegistry>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            resync_interval_secs: 60,
            max_failures: 5,
            retry_delay_secs: 2,
            image: "docker:27-cli".to_string(),
            work_root: "/var/lib/hm-agents".to_string(),
            worker_binary: PathBuf::from("/usr/local/bin/hm-agent"),
            job_template: PathBuf::from("/usr/share/hm/job-template"),
            job_repository: String::new(),
            sync_concurrency: 2,
            owner: "root".to_string(),
            upstreams: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    pub poll_interval_secs: u64,
    pub workers: usize,
    pub retry_base_ms: u64,
    pub retry_max_secs: u64,
    pub max_attempts: u32,
    /// Defaults to `<state_dir>/jobs`.
    pub work_root: Option<PathBuf>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            workers: 4,
            retry_base_ms: 1_000,
            retry_max_secs: 300,
            max_attempts: 8,
            work_root: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubscriptionConfig {
    pub tick_ms: u64,
    pub backoff_cap_secs: u64,
    pub message_retention_days: u64,
    /// Agent that runs upstream searches. Unset picks any connected agent.
    pub search_agent: Option<String>,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1_000,
            backoff_cap_secs: 3_600,
            message_retention_days: 7,
            search_agent: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostSeed {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrySeed {
    pub name: String,
    pub server: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentSeed {
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub token: String,
    /// Status the agent is created with.
    #[serde(default = "default_seed_status")]
    pub status: String,
}

fn default_seed_status() -> String {
    "Starting".to_string()
}

impl DaemonConfig {
    /// Read `path` (defaults only when `None`) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    fn apply_env(&mut self) {
        if let Some(dir) = env::state_dir() {
            self.state_dir = Some(dir);
        }
        if let Some(bind) = env::tunnel_bind() {
            self.tunnel.bind = bind;
        }
        if let Some(url) = env::redis_url() {
            self.rendezvous.backend = RendezvousBackend::Redis;
            self.rendezvous.url = url;
        }
        if let Some(dir) = env::log_dir() {
            self.log_dir = Some(dir);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.workers == 0 {
            return Err(ConfigError::Invalid("dispatch.workers must be at least 1".into()));
        }
        if self.dispatch.max_attempts == 0 {
            return Err(ConfigError::Invalid("dispatch.max_attempts must be at least 1".into()));
        }
        if self.subscription.tick_ms == 0 {
            return Err(ConfigError::Invalid("subscription.tick_ms must be positive".into()));
        }
        for agent in &self.agents {
            if !self.hosts.iter().any(|h| h.name == agent.host) {
                return Err(ConfigError::Invalid(format!(
                    "agent {} names unknown host {}",
                    agent.name, agent.host
                )));
            }
        }
        Ok(())
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(env::default_state_dir)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.store.snapshot_path.clone().unwrap_or_else(|| self.state_dir().join("snapshot.json.zst"))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir().join("hmd.pid")
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.store.checkpoint_interval_secs.max(1))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.tunnel.call_timeout_secs)
    }

    pub fn message_retention(&self) -> Duration {
        Duration::from_secs(self.subscription.message_retention_days * 86_400)
    }

    pub fn host_loop_settings(&self) -> HostLoopSettings {
        HostLoopSettings {
            resync_interval: Duration::from_secs(self.fleet.resync_interval_secs.max(1)),
            max_failures: self.fleet.max_failures,
            retry_delay: Duration::from_secs(self.fleet.retry_delay_secs),
        }
    }

    pub fn fleet_settings(&self) -> FleetSettings {
        let rendezvous_url = match self.rendezvous.backend {
            RendezvousBackend::Memory => "memory".to_string(),
            RendezvousBackend::Redis => self.rendezvous.url.clone(),
        };
        FleetSettings {
            image: self.fleet.image.clone(),
            work_root: self.fleet.work_root.clone(),
            worker_binary: self.fleet.worker_binary.clone(),
            job_template: self.fleet.job_template.clone(),
            staging_dir: self.state_dir().join("staging"),
            job_repository: self.fleet.job_repository.clone(),
            tunnel_address: self.tunnel.advertise.clone(),
            rendezvous_url,
            upstreams: self.fleet.upstreams.clone(),
            sync_concurrency: self.fleet.sync_concurrency,
            owner: self.fleet.owner.clone(),
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        let work_root =
            self.dispatch.work_root.clone().unwrap_or_else(|| self.state_dir().join("jobs"));
        DispatchSettings {
            poll_interval: Duration::from_secs(self.dispatch.poll_interval_secs.max(1)),
            workers: self.dispatch.workers,
            retry: RetryPolicy {
                base_delay: Duration::from_millis(self.dispatch.retry_base_ms),
                max_delay: Duration::from_secs(self.dispatch.retry_max_secs),
                max_attempts: self.dispatch.max_attempts,
            },
            callback: self.tunnel.advertise.clone(),
            job_repository: self.fleet.job_repository.clone(),
            ..DispatchSettings::new(work_root, self.fleet.job_template.clone())
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            tick: Duration::from_millis(self.subscription.tick_ms),
            backoff_cap: Duration::from_secs(self.subscription.backoff_cap_secs),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
