// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `hmd`: the harbor-mirror control plane.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use hm_daemon::{env, logging, startup, DaemonConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "hmd", version, about = "Image mirroring control plane")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long, env = "HM_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = DaemonConfig::load(args.config.as_deref().or(env::config_path().as_deref()))
        .context("loading configuration")?;
    let _log_guard = logging::init(config.log_dir.as_deref(), "hmd").context("setting up logging")?;

    let daemon = startup(config).await.context("starting hmd")?;
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            wait_for_signal().await;
            info!("signal received");
            cancel.cancel();
        }
    });

    if let Err(e) = daemon.run(cancel).await {
        error!(error = %e, "hmd stopped with an error");
        return Err(e.into());
    }
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut term) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
            return;
        }
    }
    let _ = tokio::signal::ctrl_c().await;
}
