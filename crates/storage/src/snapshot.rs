// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checkpoints of the store for restart recovery.
//!
//! A snapshot is the JSON form of [`Tables`], zstd-compressed. Writing goes to
//! a temporary file that is renamed into place, and the previous checkpoint is
//! kept as a rotating `.bak` file.

use crate::store::Store;
use crate::tables::Tables;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

const MAX_BAK_FILES: u32 = 3;
const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported snapshot version {0}")]
    Version(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "v")]
    pub version: u32,
    pub tables: Tables,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn capture(store: &Store) -> Self {
        Self { version: CURRENT_SNAPSHOT_VERSION, tables: store.tables(), created_at: Utc::now() }
    }

    /// Write atomically, moving any existing file at `path` into the backup rotation.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_vec(self)?;
        let tmp = path.with_extension("tmp");
        {
            let file = fs::File::create(&tmp)?;
            let mut encoder = zstd::Encoder::new(file, ZSTD_LEVEL)?;
            encoder.write_all(&json)?;
            encoder.finish()?.sync_all()?;
        }
        if path.exists() {
            fs::rename(path, rotate_bak_path(path))?;
        }
        fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), bytes = json.len(), "snapshot saved");
        Ok(())
    }

    /// `Ok(None)` when no snapshot has been written yet.
    pub fn load(path: &Path) -> Result<Option<Self>, SnapshotError> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut json = Vec::new();
        zstd::Decoder::new(file)?.read_to_end(&mut json)?;
        let snapshot: Self = serde_json::from_slice(&json)?;
        if snapshot.version > CURRENT_SNAPSHOT_VERSION {
            return Err(SnapshotError::Version(snapshot.version));
        }
        Ok(Some(snapshot))
    }
}

/// Pick the next `.bak` / `.bak.N` path, shifting older backups out.
///
/// Keeps at most [`MAX_BAK_FILES`]: `.bak`, `.bak.2`, `.bak.3`.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }
    bak(1)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
