// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane end of the tunnel: accepts agent connections.
//!
//! Each connection must open with a registration frame. After that the
//! server pushes frames from the stream's channel and reads progress reports
//! coming up from the agent.

use super::registry::TunnelRegistry;
use hm_wire::{read_frame, write_frame, AgentReport, ClientFrame, ClientPayload, ProtocolError, PushFrame};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long a new connection may take to register.
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// Frames buffered per stream before `dispatch` waits.
const PUSH_BUFFER: usize = 64;

/// Receives the progress reports agents send up the tunnel.
pub trait ReportHandler: Clone + Send + Sync + 'static {
    fn handle(&self, identity: &str, report: AgentReport);
}

pub struct TunnelServer<H: ReportHandler> {
    listener: TcpListener,
    registry: TunnelRegistry,
    reports: H,
}

impl<H: ReportHandler> TunnelServer<H> {
    pub fn new(listener: TcpListener, registry: TunnelRegistry, reports: H) -> Self {
        Self { listener, registry, reports }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `cancel` fires, one task per connection.
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("tunnel listener stopping");
                    return;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let registry = self.registry.clone();
                        let reports = self.reports.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, registry, reports, cancel).await {
                                log_connection_error(addr, e);
                            }
                        });
                    }
                    Err(e) => error!("tunnel accept error: {}", e),
                }
            }
        }
    }
}

async fn handle_connection<H: ReportHandler>(
    stream: TcpStream,
    registry: TunnelRegistry,
    reports: H,
    cancel: CancellationToken,
) -> Result<(), ProtocolError> {
    let (mut reader, mut writer) = stream.into_split();

    let hello: ClientFrame = tokio::time::timeout(HELLO_TIMEOUT, read_frame(&mut reader))
        .await
        .map_err(|_| ProtocolError::Unexpected("no registration within timeout".to_string()))??;
    if !matches!(hello.payload, ClientPayload::Hello { .. }) || hello.identity.trim().is_empty() {
        return Err(ProtocolError::Unexpected("first frame must register an identity".to_string()));
    }
    let identity = hello.identity;

    let (tx, mut rx) = mpsc::channel::<PushFrame>(PUSH_BUFFER);
    let generation = registry.register(&identity, tx);

    let writer_identity = identity.clone();
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &frame).await {
                debug!(identity = %writer_identity, error = %e, "push write failed");
                break;
            }
        }
    });

    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            frame = read_frame::<ClientFrame, _>(&mut reader) => match frame {
                Ok(frame) => match frame.payload {
                    ClientPayload::Report(report) => {
                        if frame.identity != identity {
                            warn!(identity, claimed = %frame.identity, "report under another identity");
                        }
                        reports.handle(&identity, report);
                    }
                    ClientPayload::Hello { .. } => debug!(identity, "repeated registration ignored"),
                },
                Err(e) => break Err(e),
            }
        }
    };

    // Dropping the receiver makes the next dispatch to this stream fail,
    // which is what evicts it.
    writer_task.abort();
    info!(identity, generation, "agent connection ended");
    result
}

fn log_connection_error(addr: SocketAddr, e: ProtocolError) {
    match e {
        ProtocolError::ConnectionClosed => debug!(%addr, "agent closed connection"),
        _ => warn!(%addr, error = %e, "tunnel connection error"),
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
