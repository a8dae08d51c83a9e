//! Logtail: tails a deployment's log stream in chronological order, exactly once.
//!
//! Records arrive either from a bounded historical query or from a live push
//! feed that may disconnect, reorder and duplicate. The reconciliation engine
//! merges both into one gap-free, duplicate-free sequence.
//!
//! # Crates
//!
//! * `logtail-protocol`: wire entries, records, serials and queries
//! * `logtail-core`: errors, configuration, target validation, logging and the live WebSocket feed
//! * `logtail-engine`: reorder buffer, reconciliation engine, sources and sinks
//! * `logtail-cli`: the `logtail` binary

pub use logtail_core::{TailError, Target};
pub use logtail_engine::{
    CollectingSink, EngineError, HistoricalSource, HttpHistorySource, LiveSource,
    ReconciliationEngine, ReorderBuffer, RunConfig, RunOptions, RunSummary, Sink,
};
pub use logtail_protocol::logs::{HistoryPage, LogSerial, RawEntry, Record};
