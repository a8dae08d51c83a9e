use std::sync::Arc;

use logtail_protocol::logs::Record;
use parking_lot::Mutex;

/// Destination of reconciled records. Rendering cannot fail from the
/// engine's point of view.
pub trait Sink: Send {
    fn render(&mut self, record: &Record);
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn render(&mut self, record: &Record) {
        (**self).render(record);
    }
}

/// Keeps every rendered record in memory. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    records: Arc<Mutex<Vec<Record>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    pub fn identities(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(|record| record.identity.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Sink for CollectingSink {
    fn render(&mut self, record: &Record) {
        self.records.lock().push(record.clone());
    }
}
