use async_trait::async_trait;
use logtail_core::TailError;
use logtail_protocol::logs::{HistoryPage, HistoryQuery, RawEntry};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::source::HistoricalSource;

/// Historical log endpoint reached over HTTP with bearer authentication.
#[derive(Clone)]
pub struct HttpHistorySource {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl HttpHistorySource {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, TailError> {
        let mut url = Url::parse(base_url).map_err(|err| {
            TailError::ConfigError(format!("invalid history url {base_url}: {err}"))
        })?;

        if !url.path().ends_with('/') {
            let mut path = url.path().trim_end_matches('/').to_string();
            path.push('/');
            url.set_path(&path);
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: url,
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn logs_url(&self, target: &str) -> Result<Url, TailError> {
        self.base_url
            .join(&format!("deployments/{}/logs", encode_path_segment(target)))
            .map_err(|err| {
                TailError::ConfigError(format!("invalid history url for {target}: {err}"))
            })
    }
}

#[async_trait]
impl HistoricalSource for HttpHistorySource {
    async fn fetch(&self, query: &HistoryQuery) -> Result<HistoryPage, TailError> {
        let url = self.logs_url(&query.target)?;
        let params = query_params(query);
        debug!(url = %url, ?params, "fetching history page");

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .query(&params)
            .send()
            .await
            .map_err(|err| TailError::SourceFetchFailure(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TailError::SourceFetchFailure(format!(
                "deployment not found: {}",
                query.target
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body).unwrap_or_else(|| status.to_string());
            return Err(TailError::SourceFetchFailure(format!(
                "{} ({})",
                message,
                status.as_u16()
            )));
        }

        let body: HistoryResponse = response
            .json()
            .await
            .map_err(|err| TailError::DecodeError(err.to_string()))?;

        Ok(body.into_page())
    }
}

fn query_params(query: &HistoryQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("direction", "forward".to_string()),
        ("limit", query.limit.to_string()),
    ];
    if let Some(since) = &query.since {
        params.push(("since", since.to_string()));
    }
    if let Some(until) = &query.until {
        params.push(("until", until.to_string()));
    }
    if let Some(types) = query.categories_param() {
        params.push(("types", types));
    }
    if let Some(search) = &query.search {
        params.push(("q", search.clone()));
    }
    if let Some(instance) = &query.instance_id {
        params.push(("instanceId", instance.clone()));
    }
    if let Some(team) = &query.team_id {
        params.push(("teamId", team.clone()));
    }
    params
}

fn encode_path_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let message = value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .or_else(|| value.get("error"))?;
    message.as_str().map(str::to_string)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistoryResponse {
    Entries(Vec<Value>),
    Wrapped { logs: Vec<Value> },
}

impl HistoryResponse {
    fn into_page(self) -> HistoryPage {
        let values = match self {
            HistoryResponse::Entries(values) => values,
            HistoryResponse::Wrapped { logs } => logs,
        };

        let raw_len = values.len();
        let entries = values
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<RawEntry>(value) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(?err, "skipping malformed history entry");
                    None
                }
            })
            .collect();
        HistoryPage { entries, raw_len }
    }
}
