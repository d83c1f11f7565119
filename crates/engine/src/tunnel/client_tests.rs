// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_util::until;
use crate::tunnel::{ReportHandler, TunnelRegistry, TunnelRouter, TunnelServer};
use hm_adapters::{FakeRegistryBackend, MemoryRendezvous};
use hm_core::{CorrelationId, TaskId, TaskStatus};
use hm_wire::{
    decode, encode, rendezvous_key, CallEnvelope, CallOutcome, CallResult, ClientPayload, Command,
    SearchSource, TaskReport,
};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Collected(Arc<Mutex<Vec<AgentReport>>>);

impl ReportHandler for Collected {
    fn handle(&self, _: &str, report: AgentReport) {
        self.0.lock().push(report);
    }
}

#[tokio::test]
async fn agent_answers_calls_and_reports_over_one_connection() {
    let rendezvous = MemoryRendezvous::new();
    let registry = TunnelRegistry::new();
    let collected = Collected::default();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = TunnelServer::new(listener, registry.clone(), collected.clone());
    let address = server.local_addr().unwrap().to_string();
    let cancel = CancellationToken::new();
    tokio::spawn(server.run(cancel.clone()));

    let hub = FakeRegistryBackend::new("hub").with_tags("library/nginx", &["1.24", "1.25"]);
    let responder = CommandResponder::new(vec![hub], rendezvous.clone());
    let (reporter, reports) = TunnelReporter::channel(16);
    let client = TunnelClient::new("agent-a", address, responder);
    tokio::spawn(client.run(reports, cancel.clone()));
    until(|| registry.lookup("agent-a").is_some()).await;

    let router = TunnelRouter::new(registry.clone(), rendezvous, Duration::from_secs(5));
    let tags = router
        .call(
            Some("agent-a"),
            Command::SearchTags {
                source: SearchSource::All,
                namespace: "library".into(),
                repository: "nginx".into(),
                policy: String::new(),
                size: 1,
            },
        )
        .await
        .unwrap();
    assert_eq!(tags, serde_json::json!(["1.25"]));

    let report = AgentReport::Task(TaskReport {
        task_id: TaskId::new(4),
        status: TaskStatus::Running,
        message: String::new(),
    });
    reporter.report(report.clone()).await.unwrap();
    until(|| !collected.0.lock().is_empty()).await;
    assert_eq!(collected.0.lock()[0], report);

    cancel.cancel();
}

#[tokio::test]
async fn reporter_fails_once_client_is_gone() {
    let (reporter, reports) = TunnelReporter::channel(1);
    drop(reports);
    let report = AgentReport::Task(TaskReport {
        task_id: TaskId::new(1),
        status: TaskStatus::Failed,
        message: String::new(),
    });
    assert!(reporter.report(report).await.is_err());
}

#[tokio::test]
async fn report_sent_mid_push_does_not_break_framing() {
    let rendezvous = MemoryRendezvous::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let cancel = CancellationToken::new();

    let hub = FakeRegistryBackend::new("hub").with_tags("library/nginx", &["1.24", "1.25"]);
    let responder = CommandResponder::new(vec![hub], rendezvous.clone());
    let (reporter, reports) = TunnelReporter::channel(16);
    tokio::spawn(TunnelClient::new("agent-a", address, responder).run(reports, cancel.clone()));

    let (stream, _) = listener.accept().await.unwrap();
    let (mut reader, mut writer) = stream.into_split();
    let hello: ClientFrame = read_frame(&mut reader).await.unwrap();
    assert!(matches!(hello.payload, ClientPayload::Hello { .. }));

    let envelope = CallEnvelope {
        correlation_id: CorrelationId::new(),
        command: Command::SearchTags {
            source: SearchSource::All,
            namespace: "library".into(),
            repository: "nginx".into(),
            policy: String::new(),
            size: 2,
        },
    };
    let body = encode(&PushFrame::wrap(&envelope).unwrap()).unwrap();
    let (head, tail) = body.split_at(body.len() / 2);
    writer.write_all(&(body.len() as u32).to_be_bytes()).await.unwrap();
    writer.write_all(head).await.unwrap();
    writer.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let report = AgentReport::Task(TaskReport {
        task_id: TaskId::new(9),
        status: TaskStatus::Running,
        message: String::new(),
    });
    reporter.report(report.clone()).await.unwrap();
    let sent: ClientFrame = read_frame(&mut reader).await.unwrap();
    assert_eq!(sent, ClientFrame::report("agent-a", report));

    writer.write_all(tail).await.unwrap();
    writer.flush().await.unwrap();
    let key = rendezvous_key(&envelope.correlation_id);
    let bytes = rendezvous.wait(&key, Duration::from_secs(5)).await.unwrap();
    let result: CallResult = decode(&bytes).unwrap();
    assert_eq!(result.correlation_id, envelope.correlation_id);
    assert!(matches!(result.outcome, CallOutcome::Ok { .. }), "{:?}", result.outcome);

    cancel.cancel();
}
