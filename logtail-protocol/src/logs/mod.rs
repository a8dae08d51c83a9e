mod entry;
mod query;
mod record;
mod serial;

pub use entry::RawEntry;
pub use query::{HistoryPage, HistoryQuery, SubscribeRequest, TargetKind, DEFAULT_LIMIT};
pub use record::{Category, DecodeError, HttpFields, OrderKey, Payload, Record};
pub use serial::{InvalidDate, LogSerial};
