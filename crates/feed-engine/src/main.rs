use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use gold_feed_common::config::FeedConfig;
use gold_feed_engine::{LogNotifier, PriceFeedEngine, ProviderChain};

#[derive(Parser)]
#[command(name = "gold-feed-engine", about = "Live gold price feed engine")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "feed.toml")]
    config: PathBuf,

    /// Override the polling interval, in seconds.
    #[arg(long)]
    interval: Option<u64>,

    /// Run a single refresh cycle, print the snapshot as JSON, and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut config = if args.config.exists() {
        info!("loading config from {}", args.config.display());
        FeedConfig::from_path(&args.config)?
    } else {
        info!(
            "no config file at {}, using built-in defaults",
            args.config.display()
        );
        FeedConfig::default()
    };

    if let Some(secs) = args.interval {
        config.engine.poll_interval_secs = secs;
    }
    config.validate()?;

    let chain = ProviderChain::from_config(&config);
    info!("🌐 {} price providers configured", chain.len());

    let engine = PriceFeedEngine::new(config, chain, Arc::new(LogNotifier));

    if args.once {
        engine.refresh().await;
        let view = engine.store().view().await;
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    engine.start();
    tokio::signal::ctrl_c().await?;
    engine.stop();

    Ok(())
}
