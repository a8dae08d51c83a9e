use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use logtail_core::websocket::LiveEvent;
use logtail_core::{TailError, Target};
use logtail_protocol::logs::{
    Category, HistoryQuery, LogSerial, OrderKey, RawEntry, Record, SubscribeRequest,
    DEFAULT_LIMIT,
};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::dedup::{EmittedSet, DEFAULT_DEDUP_CAPACITY};
use crate::error::EngineError;
use crate::reorder::{ReorderBuffer, DEFAULT_REORDER_DELAY};
use crate::sink::Sink;
use crate::source::{HistoricalSource, LiveSource};

type Backfill = BoxFuture<'static, Result<Vec<RawEntry>, TailError>>;

/// Unvalidated run parameters, as typed by the user.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub target: String,
    pub instance_id: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    /// Every category instead of the default subset.
    pub all: bool,
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub follow: bool,
    pub debug: bool,
    pub team_id: Option<String>,
    pub reorder_delay: Option<Duration>,
    pub dedup_capacity: Option<usize>,
}

/// Validated parameters of a single run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub target: Target,
    pub instance_id: Option<String>,
    pub since: Option<LogSerial>,
    pub until: Option<LogSerial>,
    /// Empty means every category.
    pub categories: Vec<Category>,
    pub search: Option<String>,
    pub limit: usize,
    pub follow: bool,
    /// Surfaces live feed errors, which are otherwise only counted.
    pub debug: bool,
    pub team_id: Option<String>,
    pub reorder_delay: Duration,
    pub dedup_capacity: usize,
}

impl RunConfig {
    /// Validates target and bounds. Nothing here touches a source.
    pub fn from_options(options: RunOptions) -> Result<Self, TailError> {
        let target = Target::parse(&options.target)?;
        let since = options
            .since
            .as_deref()
            .map(LogSerial::parse_bound)
            .transpose()?;
        let until = options
            .until
            .as_deref()
            .map(LogSerial::parse_bound)
            .transpose()?;

        let categories = if options.all {
            Vec::new()
        } else {
            Category::DEFAULT.to_vec()
        };

        let search = options
            .search
            .map(|query| query.trim().to_string())
            .filter(|query| !query.is_empty());

        Ok(Self {
            target,
            instance_id: options.instance_id,
            since,
            until,
            categories,
            search,
            limit: options.limit.filter(|limit| *limit > 0).unwrap_or(DEFAULT_LIMIT),
            follow: options.follow,
            debug: options.debug,
            team_id: options.team_id,
            reorder_delay: options.reorder_delay.unwrap_or(DEFAULT_REORDER_DELAY),
            dedup_capacity: options.dedup_capacity.unwrap_or(DEFAULT_DEDUP_CAPACITY),
        })
    }

    pub fn history_query(
        &self,
        since: Option<LogSerial>,
        until: Option<LogSerial>,
    ) -> HistoryQuery {
        HistoryQuery {
            target: self.target.value().to_string(),
            instance_id: self.instance_id.clone(),
            categories: self.categories.clone(),
            search: self.search.clone(),
            since,
            until,
            limit: self.limit,
            team_id: self.team_id.clone(),
        }
    }

    pub fn subscribe_request(&self) -> SubscribeRequest {
        SubscribeRequest {
            target: self.target.value().to_string(),
            target_kind: self.target.kind(),
            instance_id: self.instance_id.clone(),
            categories: self.categories.clone(),
            search: self.search.clone(),
            team_id: self.team_id.clone(),
        }
    }
}

/// Counters reported when a run ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub emitted: usize,
    pub duplicates: usize,
    /// Emitted after a record ordered later had already been emitted.
    pub late: usize,
    /// Entries that could not be decoded.
    pub skipped: usize,
    pub backfills: usize,
    pub ready_signals: usize,
    pub disconnects: usize,
    /// Transport errors reported by the live feed.
    pub feed_errors: usize,
}

/// Merges historical backfills with the live feed into one ordered,
/// duplicate-free sequence handed to the sink.
pub struct ReconciliationEngine<S> {
    config: RunConfig,
    history: Arc<dyn HistoricalSource>,
    sink: S,
    buffer: ReorderBuffer,
    emitted: EmittedSet,
    last_emitted: Option<OrderKey>,
    summary: RunSummary,
}

impl<S: Sink> ReconciliationEngine<S> {
    pub fn new(config: RunConfig, history: Arc<dyn HistoricalSource>, sink: S) -> Self {
        let buffer = ReorderBuffer::new(config.reorder_delay);
        let emitted = EmittedSet::new(config.dedup_capacity);
        Self {
            config,
            history,
            sink,
            buffer,
            emitted,
            last_emitted: None,
            summary: RunSummary::default(),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Runs in the mode selected by the configuration. `live` is only used
    /// when following.
    pub async fn run<F>(
        &mut self,
        live: &dyn LiveSource,
        token: &str,
        shutdown: F,
    ) -> Result<RunSummary, EngineError>
    where
        F: Future<Output = ()>,
    {
        if self.config.follow {
            self.follow(live, token, shutdown).await
        } else {
            self.run_once().await
        }
    }

    /// Single bounded fetch, emitted in order. Opens no subscription.
    pub async fn run_once(&mut self) -> Result<RunSummary, EngineError> {
        let query = self
            .config
            .history_query(self.config.since.clone(), self.config.until.clone());
        let page = self
            .history
            .fetch(&query)
            .await
            .map_err(EngineError::Fetch)?;

        let mut records = self.decode_batch(page.entries);
        records.sort_by(Record::cmp_order);
        self.emit_batch(records);

        info!(
            deployment = %self.config.target,
            emitted = self.summary.emitted,
            skipped = self.summary.skipped,
            "history run finished"
        );
        Ok(self.summary.clone())
    }

    /// Streams until `shutdown` resolves or the subscription ends.
    ///
    /// Every `Ready` signal triggers a backfill from the last emitted serial;
    /// live entries wait in the reorder buffer meanwhile. Buffered records are
    /// flushed on every exit path, including a fatal fetch error.
    pub async fn follow<F>(
        &mut self,
        live: &dyn LiveSource,
        token: &str,
        shutdown: F,
    ) -> Result<RunSummary, EngineError>
    where
        F: Future<Output = ()>,
    {
        let mut subscription = live
            .subscribe(self.config.subscribe_request())
            .map_err(|err| EngineError::Subscription(err.to_string()))?;
        tokio::pin!(shutdown);

        let mut backfill: Option<Backfill> = None;
        let mut backfill_again = false;

        let outcome = loop {
            // Buffer drains wait while a backfill is in flight.
            let deadline = match backfill {
                Some(_) => None,
                None => self.buffer.next_deadline(),
            };

            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    debug!("shutdown requested");
                    break Ok(());
                }
                result = poll_backfill(&mut backfill), if backfill.is_some() => {
                    backfill = None;
                    match result {
                        Ok(entries) => self.complete_backfill(entries),
                        Err(err) => break Err(EngineError::Fetch(err)),
                    }
                    if backfill_again {
                        backfill_again = false;
                        backfill = Some(self.start_backfill());
                    }
                }
                event = subscription.next_event() => {
                    let Some(event) = event else {
                        debug!("live subscription closed");
                        break Ok(());
                    };
                    match event {
                        LiveEvent::Ready => {
                            self.summary.ready_signals += 1;
                            if backfill.is_some() {
                                backfill_again = true;
                            } else {
                                backfill = Some(self.start_backfill());
                            }
                        }
                        other => self.handle_event(other, token),
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let due = self.buffer.drain_due(Instant::now());
                    self.emit_batch(due);
                }
            }
        };

        let remaining = self.buffer.drain_all();
        self.emit_batch(remaining);
        subscription.close();

        info!(
            deployment = %self.config.target,
            emitted = self.summary.emitted,
            duplicates = self.summary.duplicates,
            late = self.summary.late,
            backfills = self.summary.backfills,
            "live run finished"
        );

        outcome.map(|()| self.summary.clone())
    }

    fn handle_event(&mut self, event: LiveEvent, token: &str) {
        match event {
            LiveEvent::Connecting => debug!("live feed connecting"),
            LiveEvent::Connected => debug!("live feed connected"),
            LiveEvent::AuthRequested(challenge) => challenge.respond(token),
            LiveEvent::Disconnected => {
                self.summary.disconnects += 1;
                debug!(buffered = self.buffer.len(), "live feed disconnected");
            }
            LiveEvent::Error(message) => {
                self.summary.feed_errors += 1;
                if self.config.debug {
                    warn!(%message, "live feed error");
                }
            }
            LiveEvent::Entry(raw) => self.accept_live(raw),
            LiveEvent::Ready => {}
        }
    }

    fn accept_live(&mut self, raw: RawEntry) {
        let Some(record) = self.decode(raw) else {
            return;
        };
        if self.emitted.contains(&record.identity) || !self.buffer.push(record, Instant::now()) {
            self.summary.duplicates += 1;
        }
    }

    fn start_backfill(&mut self) -> Backfill {
        let since = self
            .last_emitted
            .as_ref()
            .map(|key| key.serial.clone())
            .or_else(|| self.config.since.clone());
        let query = self.config.history_query(since, None);
        self.summary.backfills += 1;
        debug!(since = ?query.since, "starting backfill");
        Box::pin(fetch_pages(Arc::clone(&self.history), query))
    }

    fn complete_backfill(&mut self, entries: Vec<RawEntry>) {
        let fetched = entries.len();
        let mut records = self.decode_batch(entries);
        records.extend(self.buffer.drain_all());
        records.sort_by(Record::cmp_order);
        debug!(fetched, merged = records.len(), "backfill complete");
        self.emit_batch(records);
    }

    fn decode_batch(&mut self, entries: Vec<RawEntry>) -> Vec<Record> {
        entries
            .into_iter()
            .filter_map(|raw| self.decode(raw))
            .collect()
    }

    fn decode(&mut self, raw: RawEntry) -> Option<Record> {
        match Record::decode(raw) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(%err, "skipping undecodable entry");
                self.summary.skipped += 1;
                None
            }
        }
    }

    fn emit_batch(&mut self, records: Vec<Record>) {
        for record in records {
            self.emit(record);
        }
    }

    fn emit(&mut self, record: Record) {
        if !self.emitted.insert(&record.identity) {
            self.summary.duplicates += 1;
            return;
        }

        let key = record.order_key();
        match &self.last_emitted {
            Some(last) if key < *last => {
                self.summary.late += 1;
                debug!(identity = %record.identity, serial = %record.serial, "late record emitted");
            }
            _ => self.last_emitted = Some(key),
        }

        self.sink.render(&record);
        self.summary.emitted += 1;
    }
}

async fn poll_backfill(backfill: &mut Option<Backfill>) -> Result<Vec<RawEntry>, TailError> {
    match backfill.as_mut() {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

/// Fetches forward from `query.since`, following full pages while the
/// greatest serial keeps advancing. Fullness is judged on the server's item
/// count, malformed items included.
async fn fetch_pages(
    history: Arc<dyn HistoricalSource>,
    mut query: HistoryQuery,
) -> Result<Vec<RawEntry>, TailError> {
    let mut collected = Vec::new();
    loop {
        let page = history.fetch(&query).await?;
        let full = page.is_full(query.limit);
        let greatest = page.entries.iter().filter_map(entry_serial).max();
        collected.extend(page.entries);

        if !full {
            break;
        }
        match greatest {
            Some(next) if query.since.as_ref().map_or(true, |since| next > *since) => {
                debug!(next = %next, "history page full, fetching next");
                query.since = Some(next);
            }
            _ => break,
        }
    }
    Ok(collected)
}

fn entry_serial(entry: &RawEntry) -> Option<LogSerial> {
    match entry.serial.as_deref().map(str::trim) {
        Some(serial) if !serial.is_empty() => serial.parse().ok(),
        _ => Some(LogSerial::new(entry.date, entry.id.trim())),
    }
}
