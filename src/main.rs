//! herald daemon.
//!
//! Usage:
//!   cargo run                              # live posting (needs HERALD_BROADCAST_TOKEN)
//!   cargo run -- --paper                   # log posts instead of publishing
//!   cargo run -- --config path/to.toml

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use herald::config::Config;
use herald::poller::{Poller, PollerSettings, SystemClock};
use herald::publish::{BroadcastClient, PaperSink, PublishSink};
use herald::source::GraphQlSource;
use herald::store::StateStore;
use herald::tracker::DeliveryTracker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let paper_mode = args.iter().any(|a| a == "--paper");
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("herald.toml"));

    // Load config
    let config = if Path::new(&config_path).exists() {
        Config::load(&config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))?
    } else {
        Config::from_env()
    };

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    info!(
        mode = if paper_mode { "PAPER" } else { "LIVE" },
        config = %config_path.display(),
        "herald v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    // --- Valkey State Store ---
    // Without a readable watermark nothing may be delivered, so this is fatal.
    let mut store = StateStore::connect(&config.valkey.url, &config.valkey.prefix)
        .await
        .context("failed to connect to Valkey")?;
    store.ping().await.context("Valkey ping failed")?;

    // --- Feed + Broadcast clients ---
    let source = GraphQlSource::new(
        config.feed.graphql_url.clone(),
        Duration::from_secs(config.feed.timeout_secs),
    )
    .context("failed to build feed client")?;

    let sink: Arc<dyn PublishSink> = if paper_mode {
        warn!("paper mode - posts are logged, not published");
        Arc::new(PaperSink::new())
    } else {
        let token = config.require_token()?;
        Arc::new(
            BroadcastClient::new(
                config.broadcast.api_url.clone(),
                token,
                Duration::from_secs(config.broadcast.timeout_secs),
            )
            .context("failed to build broadcast client")?,
        )
    };

    let tracker = DeliveryTracker::new(store.clone(), config.poller.retention_max);
    let mut poller = Poller::new(
        Arc::new(source),
        sink,
        store,
        tracker,
        Arc::new(SystemClock),
        PollerSettings::from(&config.poller),
    );

    // --- Shutdown ---
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutting down after in-flight delivery...");
            }
            cancel.cancel();
        });
    }

    info!(
        feed = %config.feed.graphql_url,
        prefix = %config.valkey.prefix,
        "entering poll loop - press Ctrl+C to stop"
    );
    poller.run(cancel).await;

    // Dropping the poller releases the Valkey connection.
    drop(poller);
    info!("herald stopped");
    Ok(())
}
