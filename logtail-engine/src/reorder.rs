use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use logtail_protocol::logs::{OrderKey, Record};
use tokio::time::Instant;

/// Grace period a live record waits for stragglers before it is emitted.
pub const DEFAULT_REORDER_DELAY: Duration = Duration::from_millis(300);

/// Holds recently-arrived live records for a fixed delay to undo small-scale
/// reordering on the push feed.
///
/// When a deadline expires, every buffered record ordered at or before the
/// expired one is released, so a late arrival with a smaller serial leaves
/// together with the record that overtook it.
#[derive(Debug)]
pub struct ReorderBuffer {
    delay: Duration,
    records: BTreeMap<OrderKey, Record>,
    deadlines: BTreeSet<(Instant, OrderKey)>,
    pending: HashMap<String, (OrderKey, Instant)>,
}

impl ReorderBuffer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            records: BTreeMap::new(),
            deadlines: BTreeSet::new(),
            pending: HashMap::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Buffers a record until `now + delay`. Returns `false` when a record with
    /// the same identity is already waiting; the first copy keeps its deadline.
    pub fn push(&mut self, record: Record, now: Instant) -> bool {
        if self.pending.contains_key(&record.identity) {
            return false;
        }

        let key = record.order_key();
        let deadline = now + self.delay;
        self.pending
            .insert(record.identity.clone(), (key.clone(), deadline));
        self.deadlines.insert((deadline, key.clone()));
        self.records.insert(key, record);
        true
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.iter().next().map(|(deadline, _)| *deadline)
    }

    /// Releases, in order, every record up to the greatest one whose deadline
    /// has passed.
    pub fn drain_due(&mut self, now: Instant) -> Vec<Record> {
        let cutoff = self
            .deadlines
            .iter()
            .take_while(|(deadline, _)| *deadline <= now)
            .map(|(_, key)| key)
            .max()
            .cloned();

        let Some(cutoff) = cutoff else {
            return Vec::new();
        };

        let mut drained = Vec::new();
        while let Some(entry) = self.records.first_entry() {
            if entry.key() > &cutoff {
                break;
            }
            let (key, record) = entry.remove_entry();
            self.forget(&key, &record.identity);
            drained.push(record);
        }
        drained
    }

    /// Releases everything immediately, in order.
    pub fn drain_all(&mut self) -> Vec<Record> {
        self.deadlines.clear();
        self.pending.clear();
        std::mem::take(&mut self.records).into_values().collect()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.pending.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn forget(&mut self, key: &OrderKey, identity: &str) {
        if let Some((_, deadline)) = self.pending.remove(identity) {
            self.deadlines.remove(&(deadline, key.clone()));
        }
    }
}

impl Default for ReorderBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_REORDER_DELAY)
    }
}
