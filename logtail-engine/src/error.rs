use logtail_core::TailError;
use thiserror::Error;

/// Errors that end a reconciliation run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("history fetch failed: {0}")]
    Fetch(#[source] TailError),
    #[error("live subscription failed: {0}")]
    Subscription(String),
}

impl EngineError {
    /// The underlying client error, when there is one.
    pub fn tail_error(&self) -> Option<&TailError> {
        match self {
            EngineError::Fetch(err) => Some(err),
            EngineError::Subscription(_) => None,
        }
    }
}
