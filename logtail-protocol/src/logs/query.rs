use serde::{Deserialize, Serialize};

use super::entry::RawEntry;
use super::record::Category;
use super::serial::LogSerial;

pub const DEFAULT_LIMIT: usize = 1000;

/// How the deployment was named by the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Url,
    #[default]
    Id,
}

/// Filters for a historical fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub target: String,
    #[serde(default)]
    pub instance_id: Option<String>,
    /// Empty means every category.
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub since: Option<LogSerial>,
    #[serde(default)]
    pub until: Option<LogSerial>,
    pub limit: usize,
    #[serde(default)]
    pub team_id: Option<String>,
}

impl HistoryQuery {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            instance_id: None,
            categories: Vec::new(),
            search: None,
            since: None,
            until: None,
            limit: DEFAULT_LIMIT,
            team_id: None,
        }
    }

    pub fn with_bounds(mut self, since: Option<LogSerial>, until: Option<LogSerial>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    /// Comma separated category list, `None` when unfiltered.
    pub fn categories_param(&self) -> Option<String> {
        if self.categories.is_empty() {
            return None;
        }
        Some(
            self.categories
                .iter()
                .map(Category::as_str)
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

/// One response of the history endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPage {
    pub entries: Vec<RawEntry>,
    /// Items the server sent, counting the ones that failed to parse.
    pub raw_len: usize,
}

impl HistoryPage {
    pub fn new(entries: Vec<RawEntry>) -> Self {
        let raw_len = entries.len();
        Self { entries, raw_len }
    }

    /// Whether the server filled the page, meaning more entries may follow.
    pub fn is_full(&self, limit: usize) -> bool {
        limit > 0 && self.raw_len >= limit
    }
}

impl From<Vec<RawEntry>> for HistoryPage {
    fn from(entries: Vec<RawEntry>) -> Self {
        Self::new(entries)
    }
}

/// Parameters sent when opening a live subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub target: String,
    pub target_kind: TargetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}
