//! `codewiki-mcp` binary: stdio MCP server backed by a headless browser

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use codewiki_core::{BrowserBackend, BrowserSession, LaunchSettings, WikiClient};
use codewiki_mcp::{Cli, init_tracing, serve_stdio};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    init_tracing(config.verbose);
    tracing::info!(base_url = %config.base_url, "configuration loaded");

    let session = Arc::new(BrowserSession::new(LaunchSettings::from_config(&config)));
    let backend = Arc::new(BrowserBackend::new(Arc::clone(&session), &config));
    let client = Arc::new(WikiClient::new(config, backend));

    let outcome = tokio::select! {
        served = serve_stdio(client) => served.map_err(anyhow::Error::from),
        () = shutdown_signal() => {
            tracing::info!("termination signal received");
            Ok(())
        },
    };

    if !session.shutdown(SHUTDOWN_GRACE).await {
        tracing::warn!("browser did not close within {}s", SHUTDOWN_GRACE.as_secs());
    }
    outcome
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let Ok(mut term) = signal(SignalKind::terminate()) else {
        let _ = tokio::signal::ctrl_c().await;
        return;
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = term.recv() => {},
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
