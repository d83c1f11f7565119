// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent end of the tunnel: dials the control plane, registers, answers
//! pushed commands and sends progress reports up the same connection.

use super::responder::CommandResponder;
use crate::agent::{ReportClosed, StatusReporter};
use async_trait::async_trait;
use hm_adapters::{RegistryBackend, RendezvousStore};
use hm_wire::{read_frame, write_frame, AgentReport, ClientFrame, ProtocolError, PushFrame};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Pushed commands executing at once.
const MAX_CONCURRENT_CALLS: usize = 8;

/// Decoded push frames waiting for the session loop.
const PUSH_BUFFER: usize = 16;

pub struct TunnelClient<B: RegistryBackend, R: RendezvousStore> {
    identity: String,
    address: String,
    responder: CommandResponder<B, R>,
    calls: Arc<Semaphore>,
}

impl<B: RegistryBackend, R: RendezvousStore> TunnelClient<B, R> {
    pub fn new(
        identity: impl Into<String>,
        address: impl Into<String>,
        responder: CommandResponder<B, R>,
    ) -> Self {
        Self {
            identity: identity.into(),
            address: address.into(),
            responder,
            calls: Arc::new(Semaphore::new(MAX_CONCURRENT_CALLS)),
        }
    }

    /// Stay connected until `cancel` fires, reconnecting with backoff.
    ///
    /// Reports queued while disconnected are sent after the next registration.
    pub async fn run(self, mut reports: mpsc::Receiver<AgentReport>, cancel: CancellationToken) {
        let mut backoff = INITIAL_BACKOFF;
        let mut pending = None;
        loop {
            match self.session(&mut reports, &mut pending, &mut backoff, &cancel).await {
                Ok(()) => return,
                Err(ProtocolError::ConnectionClosed) => {
                    info!(address = %self.address, "control plane closed the tunnel")
                }
                Err(e) => warn!(address = %self.address, error = %e, "tunnel session failed"),
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn session(
        &self,
        reports: &mut mpsc::Receiver<AgentReport>,
        pending: &mut Option<AgentReport>,
        backoff: &mut Duration,
        cancel: &CancellationToken,
    ) -> Result<(), ProtocolError> {
        let stream = TcpStream::connect(&self.address).await?;
        let (reader, mut writer) = stream.into_split();
        write_frame(&mut writer, &ClientFrame::register(&self.identity)).await?;
        info!(identity = %self.identity, address = %self.address, "registered with control plane");
        *backoff = INITIAL_BACKOFF;

        if let Some(report) = pending.take() {
            self.send_report(&mut writer, report, pending).await?;
        }

        // Frames are read to completion by their own task; the select below
        // only ever cancels a channel receive.
        let (frames_tx, mut frames) = mpsc::channel(PUSH_BUFFER);
        let mut reader_task = JoinSet::new();
        reader_task.spawn(read_pushes(reader, frames_tx));

        let mut reports_open = true;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                frame = frames.recv() => {
                    let frame = frame.unwrap_or(Err(ProtocolError::ConnectionClosed))?;
                    let responder = self.responder.clone();
                    let calls = Arc::clone(&self.calls);
                    tokio::spawn(async move {
                        let Ok(_permit) = calls.acquire_owned().await else { return };
                        responder.handle_frame(frame).await;
                    });
                }
                report = reports.recv(), if reports_open => match report {
                    Some(report) => self.send_report(&mut writer, report, pending).await?,
                    None => reports_open = false,
                },
            }
        }
    }

    async fn send_report(
        &self,
        writer: &mut OwnedWriteHalf,
        report: AgentReport,
        pending: &mut Option<AgentReport>,
    ) -> Result<(), ProtocolError> {
        let frame = ClientFrame::report(&self.identity, report.clone());
        if let Err(e) = write_frame(writer, &frame).await {
            *pending = Some(report);
            return Err(e);
        }
        Ok(())
    }
}

/// Forward every frame read from `reader` until the stream fails.
async fn read_pushes(
    mut reader: OwnedReadHalf,
    frames: mpsc::Sender<Result<PushFrame, ProtocolError>>,
) {
    loop {
        let frame = read_frame::<PushFrame, _>(&mut reader).await;
        let failed = frame.is_err();
        if frames.send(frame).await.is_err() || failed {
            return;
        }
    }
}

/// [`StatusReporter`] that queues reports for the tunnel connection.
#[derive(Clone)]
pub struct TunnelReporter {
    tx: mpsc::Sender<AgentReport>,
}

impl TunnelReporter {
    /// Reporter plus the receiver to hand to [`TunnelClient::run`].
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AgentReport>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl StatusReporter for TunnelReporter {
    async fn report(&self, report: AgentReport) -> Result<(), ReportClosed> {
        self.tx.send(report).await.map_err(|_| ReportClosed)
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
