// End-to-end reconnection: live feed server closes the socket, the client
// reconnects and the engine closes the gap with a fresh backfill.
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use logtail::{CollectingSink, HttpHistorySource, ReconciliationEngine, RunConfig, RunOptions};
use logtail_core::websocket::{
    LiveEvent, LiveFeedClient, ReconnectPolicy, WebSocketEnvelope, LOGS_EVENT, LOG_EVENT,
    READY_EVENT,
};
use logtail_protocol::logs::{SubscribeRequest, TargetKind};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn entry(id: &str, millis: i64) -> Value {
    json!({
        "id": id,
        "serial": format!("{millis}-{id}"),
        "date": millis,
        "type": "stdout",
        "text": format!("line {id}"),
    })
}

/// Accepts one connection, checks the handshake, sends `frames` and closes.
/// Returns the authentication payload.
async fn serve_once(listener: &TcpListener, frames: Vec<WebSocketEnvelope>) -> Value {
    let (stream, _) = listener.accept().await.expect("accept");
    let mut ws = tokio_tungstenite::accept_async(stream)
        .await
        .expect("handshake");

    let hello = ws.next().await.expect("hello").expect("message");
    let envelope: WebSocketEnvelope =
        serde_json::from_str(&hello.into_text().expect("text")).expect("envelope");
    assert_eq!(envelope.event, "authenticate");

    for frame in frames {
        ws.send(frame.to_message().expect("encode"))
            .await
            .expect("send frame");
    }
    let _ = ws.close(None).await;
    envelope.payload
}

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy::new(Duration::from_millis(10), Duration::from_millis(50))
}

#[tokio::test]
async fn live_feed_reauthenticates_after_server_disconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("listener");
    let addr = listener.local_addr().expect("addr");
    let (auth_tx, mut auth_rx) = mpsc::unbounded_channel();

    let server = tokio::spawn(async move {
        for round in 0..2 {
            let frames = vec![
                WebSocketEnvelope::new(READY_EVENT, Value::Null),
                WebSocketEnvelope::new(LOG_EVENT, entry(&format!("r{round}"), 1000 + round)),
            ];
            let payload = serve_once(&listener, frames).await;
            let _ = auth_tx.send(payload);
        }
    });

    let client = LiveFeedClient::new(&format!("ws://{addr}/logs/stream"))
        .expect("client")
        .with_policy(fast_policy());
    let mut subscription = client.subscribe(SubscribeRequest {
        target: "dpl_e2e".into(),
        target_kind: TargetKind::Id,
        instance_id: None,
        categories: Vec::new(),
        search: None,
        team_id: Some("team_1".into()),
    });

    let mut auth_requests = 0;
    let mut readies = 0;
    let mut entries = Vec::new();
    let mut disconnects = 0;
    while readies < 2 || entries.len() < 2 || disconnects < 2 {
        let event = timeout(Duration::from_secs(5), subscription.next_event())
            .await
            .expect("event in time")
            .expect("subscription open");
        match event {
            LiveEvent::AuthRequested(challenge) => {
                auth_requests += 1;
                challenge.respond("feed-token");
            }
            LiveEvent::Ready => readies += 1,
            LiveEvent::Entry(raw) => entries.push(raw.id),
            LiveEvent::Disconnected => disconnects += 1,
            _ => {}
        }
    }
    subscription.close();

    assert_eq!(auth_requests, 2);
    assert_eq!(entries, ["r0", "r1"]);

    let first = auth_rx.recv().await.expect("auth payload");
    assert_eq!(first["token"], "feed-token");
    assert_eq!(first["subscription"]["target"], "dpl_e2e");
    assert_eq!(first["subscription"]["team_id"], "team_1");

    server.abort();
}

#[tokio::test]
async fn engine_closes_the_gap_across_reconnects() {
    let history = MockServer::start().await;
    // e3 was written while the feed was down; e2 also arrives live.
    Mock::given(method("GET"))
        .and(path("/deployments/dpl_e2e/logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            entry("e1", 1000),
            entry("e2", 2000),
            entry("e3", 3000),
        ])))
        .mount(&history)
        .await;

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("listener");
    let addr = listener.local_addr().expect("addr");
    let server = tokio::spawn(async move {
        serve_once(
            &listener,
            vec![
                WebSocketEnvelope::new(READY_EVENT, Value::Null),
                WebSocketEnvelope::new(LOG_EVENT, entry("e2", 2000)),
            ],
        )
        .await;
        serve_once(
            &listener,
            vec![
                WebSocketEnvelope::new(LOGS_EVENT, json!([entry("e4", 4000)])),
                WebSocketEnvelope::new(READY_EVENT, Value::Null),
            ],
        )
        .await;
    });

    let config = RunConfig::from_options(RunOptions {
        target: "dpl_e2e".into(),
        follow: true,
        reorder_delay: Some(Duration::from_millis(50)),
        ..RunOptions::default()
    })
    .expect("config");
    let source = HttpHistorySource::new(&history.uri(), "tkn").expect("history");
    let live = LiveFeedClient::new(&format!("ws://{addr}/logs/stream"))
        .expect("client")
        .with_policy(fast_policy());
    let sink = CollectingSink::new();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let mut engine = ReconciliationEngine::new(config, Arc::new(source), sink.clone());
    let run = tokio::spawn(async move {
        engine
            .follow(&live, "tkn", async move {
                let _ = stop_rx.await;
            })
            .await
    });

    timeout(Duration::from_secs(5), async {
        while sink.len() < 4 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("all records emitted");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let _ = stop_tx.send(());
    let summary = run.await.expect("engine task").expect("run");

    assert_eq!(sink.identities(), ["e1", "e2", "e3", "e4"]);
    assert_eq!(summary.emitted, 4);
    assert!(summary.backfills >= 2);
    assert_eq!(summary.late, 0);

    server.abort();
}
