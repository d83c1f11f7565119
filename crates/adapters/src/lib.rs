// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hm-adapters: seams to the collaborators the control plane drives but does
//! not implement (remote shells, the rendezvous store, git, docker, registries).

pub mod credentials;
pub mod image;
mod process;
pub mod publish;
pub mod registry;
pub mod rendezvous;
pub mod shell;

pub use credentials::{CredentialRenderer, PlainCredentialRenderer, RegistryAuth};
pub use image::{DockerImageMover, ImageError, ImageMover};
pub use publish::{FetchedJob, GitJobSource, GitPublisher, JobPublisher, JobSource, PublishError};
pub use registry::{HttpRegistryBackend, RegistryBackend, RegistryError};
pub use rendezvous::{MemoryRendezvous, RedisRendezvous, RendezvousError, RendezvousStore};
pub use shell::{CommandOutput, RemoteShell, ShellError, SshShell};

#[cfg(any(test, feature = "test-support"))]
pub use image::{FakeImageMover, ImageCall};
#[cfg(any(test, feature = "test-support"))]
pub use publish::{FakeJobSource, FakePublisher, PublishCall};
#[cfg(any(test, feature = "test-support"))]
pub use registry::{FakeRegistryBackend, RegistryCall};
#[cfg(any(test, feature = "test-support"))]
pub use shell::{FakeRemoteShell, ShellCall};
