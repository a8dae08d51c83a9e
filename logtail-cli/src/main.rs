use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use logtail_core::config::ClientConfig;
use logtail_core::logging::init_tracing;
use logtail_core::websocket::LiveFeedClient;
use logtail_engine::{HttpHistorySource, ReconciliationEngine, RunConfig, RunOptions};
use tracing::debug;

mod credentials;
mod render;

use render::{OutputFormat, TerminalSink};

#[derive(Parser)]
#[command(name = "logtail")]
#[command(about = "Logtail - deployment logs in order, exactly once", long_about = None)]
struct Cli {
    /// Deployment URL (host only) or deployment id
    target: String,
    /// Only show logs from this instance
    #[arg(long)]
    instance: Option<String>,
    /// Start from this date (RFC 3339, "YYYY-MM-DD HH:MM" or epoch millis)
    #[arg(long)]
    since: Option<String>,
    /// Stop at this date (ignored when following)
    #[arg(long)]
    until: Option<String>,
    /// Show every category, including HTTP requests and responses
    #[arg(long, default_value_t = false)]
    all: bool,
    /// Only show records matching this search query
    #[arg(long)]
    query: Option<String>,
    /// Maximum records per history page
    #[arg(short = 'n', long)]
    limit: Option<usize>,
    /// Keep streaming new records
    #[arg(short, long, default_value_t = false)]
    follow: bool,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Short)]
    output: OutputFormat,
    /// Print diagnostics to stderr, overriding RUST_LOG
    #[arg(long, default_value_t = false)]
    debug: bool,
    #[arg(long)]
    token: Option<String>,
    #[arg(long, env = "LOGTAIL_TEAM")]
    team: Option<String>,
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    stream_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(cli.debug.then_some("debug"))
        .context("failed to initialise logging")?;

    let mut config = ClientConfig::from_env().context("invalid configuration")?;
    config
        .apply_overrides(cli.api_url.as_deref(), cli.stream_url.as_deref())
        .context("invalid endpoint override")?;

    let run_config = RunConfig::from_options(RunOptions {
        target: cli.target,
        instance_id: cli.instance,
        since: cli.since,
        until: cli.until,
        all: cli.all,
        search: cli.query,
        limit: cli.limit,
        follow: cli.follow,
        debug: cli.debug,
        team_id: None,
        reorder_delay: Some(config.reorder_delay),
        dedup_capacity: None,
    })?;

    let credentials = credentials::resolve(cli.token.as_deref())?;
    debug!(source = ?credentials.source, "credentials resolved");
    let team_id = cli
        .team
        .or_else(|| config.team_id.clone())
        .or_else(|| credentials.team_id.clone());
    let run_config = RunConfig {
        team_id,
        ..run_config
    };

    let history = Arc::new(
        HttpHistorySource::new(config.api_url(), credentials.token.clone())
            .context("invalid history endpoint")?,
    );
    let live = LiveFeedClient::new(config.stream_url())
        .context("invalid stream endpoint")?
        .with_policy(config.reconnect);

    if !atty::is(atty::Stream::Stdout) {
        colored::control::set_override(false);
    }

    let mut engine =
        ReconciliationEngine::new(run_config, history, TerminalSink::stdout(cli.output));
    let summary = engine
        .run(&live, &credentials.token, shutdown_signal())
        .await
        .context("log tail failed")?;

    debug!(?summary, "run finished");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sigterm) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
