use std::collections::{HashSet, VecDeque};

pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

/// Identities already handed to the sink.
///
/// Bounded FIFO: once full, the oldest identity is forgotten first.
#[derive(Debug)]
pub struct EmittedSet {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl EmittedSet {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            seen: HashSet::with_capacity(capacity.min(1024)),
            order: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.seen.contains(identity)
    }

    /// Records an identity. Returns `false` when it was already present.
    pub fn insert(&mut self, identity: &str) -> bool {
        if self.seen.contains(identity) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(identity.to_string());
        self.order.push_back(identity.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for EmittedSet {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}
