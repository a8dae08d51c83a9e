use async_trait::async_trait;
use logtail_core::websocket::{LiveFeedClient, LiveSubscription};
use logtail_core::TailError;
use logtail_protocol::logs::{HistoryPage, HistoryQuery, SubscribeRequest};

/// Pull side: returns a finite batch for a bounded query.
///
/// Implementations must be idempotent; the engine calls `fetch` again with a
/// different lower bound after every reconnect. `HistoryPage::raw_len` must
/// count every item the server sent, so paging survives dropped entries.
#[async_trait]
pub trait HistoricalSource: Send + Sync {
    async fn fetch(&self, query: &HistoryQuery) -> Result<HistoryPage, TailError>;
}

/// Push side: opens a subscription that delivers lifecycle signals and raw
/// entries until it is closed. Connection failures after the subscription is
/// open are reported as events, not as errors.
pub trait LiveSource: Send + Sync {
    fn subscribe(&self, request: SubscribeRequest) -> Result<LiveSubscription, TailError>;
}

impl LiveSource for LiveFeedClient {
    fn subscribe(&self, request: SubscribeRequest) -> Result<LiveSubscription, TailError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(TailError::SubscriptionError(
                "live feed requires a tokio runtime".into(),
            ));
        }
        Ok(LiveFeedClient::subscribe(self, request))
    }
}
