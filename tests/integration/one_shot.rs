// One-shot runs: a single bounded fetch, sorted output, no live subscription.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use logtail::{
    CollectingSink, HistoricalSource, HistoryPage, LiveSource, LogSerial, RawEntry,
    ReconciliationEngine, RunConfig, RunOptions, TailError,
};
use logtail_core::websocket::LiveSubscription;
use logtail_protocol::logs::{HistoryQuery, SubscribeRequest};
use mockall::mock;

mock! {
    pub History {}

    #[async_trait]
    impl HistoricalSource for History {
        async fn fetch(&self, query: &HistoryQuery) -> Result<HistoryPage, TailError>;
    }
}

#[derive(Default)]
struct CountingLive {
    subscriptions: AtomicUsize,
}

impl LiveSource for CountingLive {
    fn subscribe(&self, _request: SubscribeRequest) -> Result<LiveSubscription, TailError> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Err(TailError::SubscriptionError("not expected".into()))
    }
}

fn entry(id: &str, millis: i64) -> RawEntry {
    RawEntry::text(id, format!("{millis}-{id}"), millis, "stdout", id)
}

#[tokio::test]
async fn performs_exactly_one_fetch_and_no_subscription() {
    let mut history = MockHistory::new();
    history
        .expect_fetch()
        .withf(|query| {
            query.target == "dpl_abc"
                && query.since == Some(LogSerial::from_millis(1_709_251_200_000))
                && query.until == Some(LogSerial::from_millis(1_709_337_600_000))
                && query.limit == 20
        })
        .times(1)
        .returning(|_| {
            Ok(vec![
                entry("e3", 1_709_251_200_300),
                entry("e1", 1_709_251_200_100),
                entry("e2", 1_709_251_200_200),
                entry("e1", 1_709_251_200_100),
            ]
            .into())
        });

    let config = RunConfig::from_options(RunOptions {
        target: "dpl_abc".into(),
        since: Some("2024-03-01".into()),
        until: Some("2024-03-02".into()),
        limit: Some(20),
        ..RunOptions::default()
    })
    .expect("valid options");

    let sink = CollectingSink::new();
    let live = CountingLive::default();
    let mut engine = ReconciliationEngine::new(config, Arc::new(history), sink.clone());
    let summary = engine
        .run(&live, "token", std::future::pending())
        .await
        .expect("run");

    assert_eq!(sink.identities(), ["e1", "e2", "e3"]);
    assert_eq!(summary.emitted, 3);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(live.subscriptions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fetch_failure_is_fatal() {
    let mut history = MockHistory::new();
    history
        .expect_fetch()
        .times(1)
        .returning(|_| Err(TailError::SourceFetchFailure("deployment not found: dpl_x".into())));

    let config = RunConfig::from_options(RunOptions {
        target: "dpl_x".into(),
        ..RunOptions::default()
    })
    .expect("valid options");
    let mut engine = ReconciliationEngine::new(config, Arc::new(history), CollectingSink::new());

    let err = engine.run_once().await.unwrap_err();
    assert!(matches!(
        err.tail_error(),
        Some(TailError::SourceFetchFailure(message)) if message.contains("not found")
    ));
}

#[test]
fn invalid_since_is_rejected_before_any_source_call() {
    let mut history = MockHistory::new();
    history.expect_fetch().never();

    let err = RunConfig::from_options(RunOptions {
        target: "dpl_abc".into(),
        since: Some("not-a-date".into()),
        ..RunOptions::default()
    })
    .unwrap_err();

    assert!(matches!(err, TailError::InvalidDateFormat(ref raw) if raw == "not-a-date"));
}
