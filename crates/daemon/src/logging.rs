// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracing setup shared by `hmd` and `hm-agent`.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` if set and valid, `info` otherwise.
pub fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. With a log directory, output goes to a
/// daily rotated `<file_prefix>.log` there and the returned guard must be
/// held until exit so buffered lines are flushed.
pub fn init(log_dir: Option<&Path>, file_prefix: &str) -> std::io::Result<Option<WorkerGuard>> {
    let registry = tracing_subscriber::registry().with(filter());
    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender =
                tracing_appender::rolling::daily(dir, format!("{file_prefix}.log"));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Ok(Some(guard))
        }
        None => {
            registry.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)).init();
            Ok(None)
        }
    }
}
