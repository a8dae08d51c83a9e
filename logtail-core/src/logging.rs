use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

use crate::errors::{Result, TailError};

const DEFAULT_LEVEL: &str = "warn";

/// Initializes the tracing subscriber used by the client.
///
/// An explicit `level` wins over `RUST_LOG`; without one, `RUST_LOG` applies
/// and falls back to `warn`. Output goes to stderr so diagnostics never
/// interleave with rendered records.
pub fn init_tracing(level: Option<&str>) -> Result<()> {
    let directives = filter_directives(level, std::env::var(EnvFilter::DEFAULT_ENV).ok());
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .try_init()
        .map_err(|err| TailError::GeneralError(err.to_string()))?;

    Ok(())
}

fn filter_directives(level: Option<&str>, from_env: Option<String>) -> String {
    if let Some(level) = level {
        return level.to_string();
    }
    from_env
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string())
}
