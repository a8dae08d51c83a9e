//! Logtail Engine - reconciles historical backfills with a live log feed.

pub mod dedup;
pub mod engine;
pub mod error;
pub mod history_client;
pub mod reorder;
pub mod sink;
pub mod source;

pub use dedup::{EmittedSet, DEFAULT_DEDUP_CAPACITY};
pub use engine::{ReconciliationEngine, RunConfig, RunOptions, RunSummary};
pub use error::EngineError;
pub use history_client::HttpHistorySource;
pub use reorder::{ReorderBuffer, DEFAULT_REORDER_DELAY};
pub use sink::{CollectingSink, Sink};
pub use source::{HistoricalSource, LiveSource};
