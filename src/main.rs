mod config;
mod dashboard;
mod error;
mod model;
mod prices;
mod rollup;
mod store;
mod valuation;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use crate::{
    config::Settings,
    dashboard::DashboardState,
    prices::CoinGeckoFeed,
    store::SqliteStore,
};

#[derive(Debug, Parser)]
#[command(name = "betsync-admin", version)]
struct Cli {
    /// Override BIND_HOST
    #[arg(long)]
    host: Option<String>,
    /// Override BIND_PORT
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    if let Some(h) = cli.host {
        settings.bind_host = h;
    }
    if let Some(p) = cli.port {
        settings.bind_port = p;
    }

    let store = SqliteStore::new(&settings.sqlite_path)?;
    store.init_db()?;

    let feed = CoinGeckoFeed::new(
        &settings.price_base_url,
        Duration::from_millis(settings.price_timeout_ms),
    );

    log::info!(
        "app.start bind={}:{} sqlite={} price_feed={}",
        settings.bind_host,
        settings.bind_port,
        store.path(),
        settings.price_base_url
    );

    dashboard::serve(DashboardState {
        settings,
        store: Arc::new(store),
        feed: Arc::new(feed),
    })
    .await?;
    Ok(())
}
