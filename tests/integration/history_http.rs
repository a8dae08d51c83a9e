// HTTP history source against a mocked log endpoint.
use std::sync::Arc;
use std::time::Duration;

use logtail::{
    CollectingSink, HistoricalSource, HttpHistorySource, LiveSource, LogSerial,
    ReconciliationEngine, RunConfig, RunOptions, TailError,
};
use logtail_core::websocket::{LiveEvent, LiveSubscription};
use logtail_protocol::logs::{Category, HistoryQuery, SubscribeRequest};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn entry(id: &str, millis: i64, kind: &str) -> serde_json::Value {
    json!({
        "id": id,
        "serial": format!("{millis}-{id}"),
        "date": millis,
        "type": kind,
        "text": format!("line {id}"),
    })
}

#[tokio::test]
async fn sends_filters_and_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/deployments/dpl_123/logs"))
        .and(header("authorization", "Bearer secret-token"))
        .and(query_param("since", "1000"))
        .and(query_param("limit", "50"))
        .and(query_param("types", "stdout,stderr"))
        .and(query_param("q", "timeout"))
        .and(query_param("instanceId", "inst_1"))
        .and(query_param("direction", "forward"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "logs": [entry("a", 1000, "stdout"), entry("b", 1001, "stderr")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = HttpHistorySource::new(&server.uri(), "secret-token").expect("source");
    let mut query =
        HistoryQuery::new("dpl_123").with_bounds(Some(LogSerial::from_millis(1000)), None);
    query.limit = 50;
    query.categories = vec![Category::Stdout, Category::Stderr];
    query.search = Some("timeout".into());
    query.instance_id = Some("inst_1".into());

    let page = source.fetch(&query).await.expect("fetch");
    let ids: Vec<_> = page.entries.iter().map(|entry| entry.id.as_str()).collect();
    assert_eq!(ids, ["a", "b"]);
    assert_eq!(page.raw_len, 2);
}

#[tokio::test]
async fn missing_deployment_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/deployments/dpl_gone/logs"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = HttpHistorySource::new(&server.uri(), "t").expect("source");
    let err = source.fetch(&HistoryQuery::new("dpl_gone")).await.unwrap_err();
    assert!(matches!(
        err,
        TailError::SourceFetchFailure(ref msg) if msg.contains("deployment not found")
    ));
}

#[tokio::test]
async fn server_errors_carry_the_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"error": {"message": "not allowed"}})),
        )
        .mount(&server)
        .await;

    let source = HttpHistorySource::new(&server.uri(), "t").expect("source");
    let err = source.fetch(&HistoryQuery::new("dpl_1")).await.unwrap_err();
    match err {
        TailError::SourceFetchFailure(message) => {
            assert!(message.contains("not allowed"));
            assert!(message.contains("403"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn one_shot_run_over_http_is_ordered() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/deployments/my-app.example.app/logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            entry("c", 3000, "exit"),
            entry("a", 1000, "command"),
            {"id": "", "date": 1500, "type": "stdout"},
            entry("b", 2000, "stdout"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = RunConfig::from_options(RunOptions {
        target: "https://my-app.example.app".into(),
        ..RunOptions::default()
    })
    .expect("config");
    let source = HttpHistorySource::new(&server.uri(), "t").expect("source");
    let sink = CollectingSink::new();
    let mut engine = ReconciliationEngine::new(config, Arc::new(source), sink.clone());

    let summary = engine.run_once().await.expect("run");
    assert_eq!(sink.identities(), ["a", "b", "c"]);
    assert_eq!(summary.skipped, 1);
}

struct ChannelLive(Mutex<Option<mpsc::UnboundedReceiver<LiveEvent>>>);

impl LiveSource for ChannelLive {
    fn subscribe(&self, _request: SubscribeRequest) -> Result<LiveSubscription, TailError> {
        self.0
            .lock()
            .take()
            .map(LiveSubscription::from_receiver)
            .ok_or_else(|| TailError::SubscriptionError("already subscribed".into()))
    }
}

#[tokio::test]
async fn backfill_pages_past_a_full_page_with_a_malformed_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/deployments/dpl_paged/logs"))
        .and(query_param("since", "3000-c"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            entry("c", 3000, "stdout"),
            entry("d", 4000, "stdout"),
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/deployments/dpl_paged/logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            entry("a", 1000, "stdout"),
            {"id": "bad"},
            entry("c", 3000, "stdout"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = RunConfig::from_options(RunOptions {
        target: "dpl_paged".into(),
        all: true,
        follow: true,
        limit: Some(3),
        reorder_delay: Some(Duration::from_millis(20)),
        ..RunOptions::default()
    })
    .expect("config");
    let source = HttpHistorySource::new(&server.uri(), "t").expect("source");
    let (events, rx) = mpsc::unbounded_channel();
    let live = ChannelLive(Mutex::new(Some(rx)));
    let sink = CollectingSink::new();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let mut engine = ReconciliationEngine::new(config, Arc::new(source), sink.clone());
    let run = tokio::spawn(async move {
        engine
            .follow(&live, "t", async move {
                let _ = stop_rx.await;
            })
            .await
    });

    events.send(LiveEvent::Ready).expect("engine alive");
    timeout(Duration::from_secs(5), async {
        while sink.len() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("second page fetched");

    let _ = stop_tx.send(());
    let summary = run.await.expect("engine task").expect("run");
    assert_eq!(sink.identities(), ["a", "c", "d"]);
    assert_eq!(summary.duplicates, 1);
    server.verify().await;
}
