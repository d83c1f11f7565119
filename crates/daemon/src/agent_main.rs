// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `hm-agent`: runs inside an agent container.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use hm_daemon::{load_agent_config, logging, run_agent};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "hm-agent", version, about = "Image mirroring agent worker")]
struct Args {
    /// Staged agent configuration (YAML).
    #[arg(short, long, default_value = "/hm/agent.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = logging::init(None, "hm-agent").context("setting up logging")?;
    let config = load_agent_config(&args.config)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            cancel.cancel();
        }
    });
    run_agent(config, cancel).await?;
    Ok(())
}
