// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upstream registry API, as seen from the agent that performs searches.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The namespace or repository does not exist upstream.
    #[error("{0} not found")]
    NotFound(String),
    #[error("unauthorized for {0}")]
    Unauthorized(String),
    #[error("registry request failed: {0}")]
    Http(String),
}

impl From<reqwest::Error> for RegistryError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

#[async_trait]
pub trait RegistryBackend: Clone + Send + Sync + 'static {
    /// Name used to pick this backend out of a configured set.
    fn name(&self) -> &str;

    /// All tags of `namespace/repository`, in the order the registry returns them.
    async fn list_tags(&self, namespace: &str, repository: &str)
        -> Result<Vec<String>, RegistryError>;

    /// Make sure `namespace` exists so pushes into it succeed. Idempotent.
    async fn create_repository(&self, namespace: &str, repository: &str)
        -> Result<(), RegistryError>;
}

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Registry speaking the distribution v2 API, with Harbor's project API for
/// namespace creation.
#[derive(Clone)]
pub struct HttpRegistryBackend {
    name: String,
    base_url: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl HttpRegistryBackend {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(20)).build()?;
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            client,
        })
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.username.is_empty() {
            request
        } else {
            request.basic_auth(&self.username, Some(&self.password))
        }
    }
}

#[async_trait]
impl RegistryBackend for HttpRegistryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tags(
        &self,
        namespace: &str,
        repository: &str,
    ) -> Result<Vec<String>, RegistryError> {
        let path = format!("{namespace}/{repository}");
        let url = format!("{}/v2/{path}/tags/list?n=1000", self.base_url);
        let response = self.authed(self.client.get(&url)).send().await?;
        match response.status() {
            reqwest::StatusCode::NOT_FOUND => return Err(RegistryError::NotFound(path)),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                return Err(RegistryError::Unauthorized(path))
            }
            _ => {}
        }
        let list: TagList = response.error_for_status()?.json().await?;
        Ok(list.tags.unwrap_or_default())
    }

    async fn create_repository(
        &self,
        namespace: &str,
        repository: &str,
    ) -> Result<(), RegistryError> {
        let url = format!("{}/api/v2.0/projects", self.base_url);
        let body = serde_json::json!({ "project_name": namespace, "metadata": { "public": "false" } });
        let response = self.authed(self.client.post(&url)).json(&body).send().await?;
        match response.status() {
            s if s.is_success() => {}
            // Already exists.
            reqwest::StatusCode::CONFLICT => {}
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                return Err(RegistryError::Unauthorized(namespace.to_string()))
            }
            other => return Err(RegistryError::Http(format!("create {namespace}: {other}"))),
        }
        tracing::info!(backend = %self.name, namespace, repository, "repository namespace ensured");
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{RegistryBackend, RegistryError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum RegistryCall {
        ListTags { namespace: String, repository: String },
        CreateRepository { namespace: String, repository: String },
    }

    #[derive(Default)]
    struct FakeRegistryState {
        calls: Vec<RegistryCall>,
        repositories: HashMap<String, Vec<String>>,
        down: bool,
    }

    /// Registry with a fixed catalogue. Unknown repositories are `NotFound`.
    #[derive(Clone)]
    pub struct FakeRegistryBackend {
        name: String,
        inner: Arc<Mutex<FakeRegistryState>>,
    }

    impl FakeRegistryBackend {
        pub fn new(name: &str) -> Self {
            Self { name: name.to_string(), inner: Arc::default() }
        }

        pub fn with_tags(self, path: &str, tags: &[&str]) -> Self {
            self.inner
                .lock()
                .repositories
                .insert(path.to_string(), tags.iter().map(|t| t.to_string()).collect());
            self
        }

        /// Every request fails with a transport error.
        pub fn set_down(&self, down: bool) {
            self.inner.lock().down = down;
        }

        pub fn calls(&self) -> Vec<RegistryCall> {
            self.inner.lock().calls.clone()
        }
    }

    #[async_trait]
    impl RegistryBackend for FakeRegistryBackend {
        fn name(&self) -> &str {
            &self.name
        }

        async fn list_tags(
            &self,
            namespace: &str,
            repository: &str,
        ) -> Result<Vec<String>, RegistryError> {
            let mut state = self.inner.lock();
            state.calls.push(RegistryCall::ListTags {
                namespace: namespace.to_string(),
                repository: repository.to_string(),
            });
            if state.down {
                return Err(RegistryError::Http("connection refused".to_string()));
            }
            let path = format!("{namespace}/{repository}");
            state.repositories.get(&path).cloned().ok_or(RegistryError::NotFound(path))
        }

        async fn create_repository(
            &self,
            namespace: &str,
            repository: &str,
        ) -> Result<(), RegistryError> {
            let mut state = self.inner.lock();
            state.calls.push(RegistryCall::CreateRepository {
                namespace: namespace.to_string(),
                repository: repository.to_string(),
            });
            if state.down {
                return Err(RegistryError::Http("connection refused".to_string()));
            }
            state.repositories.entry(format!("{namespace}/{repository}")).or_default();
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeRegistryBackend, RegistryCall};
