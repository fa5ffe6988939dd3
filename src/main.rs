//! # Tripbell — commute departure alerts
//!
//! Usage:
//!   tripbell                            # Run with ~/.tripbell/config.toml
//!   tripbell --config ./tripbell.toml   # Custom config
//!   tripbell --refresh-now              # Re-route every trip once and exit

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use tripbell_core::{RoutingClient, TripStore, TripbellConfig};
use tripbell_routing::HttpRoutingClient;
use tripbell_scheduler::{
    DiscordWebhookHandler, LogHandler, TripWatcher, WatcherSettings, WebhookHandler,
};
use tripbell_store::SqliteTripStore;

#[derive(Parser)]
#[command(name = "tripbell", version, about = "🔔 Tripbell — commute departure alerts")]
struct Cli {
    /// Config file (defaults to ~/.tripbell/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Re-route every stored trip once and exit
    #[arg(long)]
    refresh_now: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

fn load_config(path: Option<&Path>) -> Result<TripbellConfig> {
    let mut config = match path {
        Some(path) => TripbellConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => TripbellConfig::load()?,
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "tripbell=debug,tripbell_scheduler=debug,tripbell_routing=debug,tripbell_store=debug"
    } else {
        "tripbell=info,tripbell_scheduler=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;

    let db_path = expand_path(&config.store.path);
    let store: Arc<dyn TripStore> = Arc::new(SqliteTripStore::open(Path::new(&db_path))?);
    let routing: Arc<dyn RoutingClient> = Arc::new(HttpRoutingClient::new(&config.routing)?);
    tracing::info!("📂 Trip store: {db_path}");
    tracing::info!("🧭 Routing service: {}", config.routing.base_url);

    let mut watcher = TripWatcher::new(
        Arc::clone(&store),
        routing,
        WatcherSettings::from_config(&config),
    );

    if cli.refresh_now {
        let report = watcher.refresh_all_trips().await?;
        println!("♻️  Refreshed {} trips ({} failed)", report.updated, report.failed);
        return Ok(());
    }

    watcher.add_handler(LogHandler);
    if !config.notify.webhook_url.is_empty() {
        watcher.add_handler(WebhookHandler::new(&config.notify.webhook_url, Arc::clone(&store)));
        tracing::info!("🔗 Webhook notifications enabled");
    }
    if !config.notify.discord_webhook_url.is_empty() {
        watcher.add_handler(DiscordWebhookHandler::new(
            &config.notify.discord_webhook_url,
            Arc::clone(&store),
        ));
        tracing::info!("💬 Discord notifications enabled");
    }
    if config.routing.source_url.is_empty() {
        tracing::warn!("⚠️ routing.source_url is empty, stale data refreshes will likely fail");
    }

    watcher.start();
    tracing::info!("🔔 Tripbell running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("🛑 Shutting down...");
    let dropped = watcher.dropped_count();
    watcher.stop().await;
    if dropped > 0 {
        tracing::warn!("📭 {dropped} notifications were dropped this session");
    }
    Ok(())
}
