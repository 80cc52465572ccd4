use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::future::join_all;
use tracing::info;

use nft_cast_bot::api::ExplorerClient;
use nft_cast_bot::config::{AppConfig, CONFIG_PATH, Secrets};
use nft_cast_bot::neynar::NeynarClient;
use nft_cast_bot::poller::{Poller, SaleFormat};
use nft_cast_bot::publish::{DryRunPublisher, Publisher};
use nft_cast_bot::state::{FileWatermarkStore, MemoryWatermarkStore, WatermarkStore};
use nft_cast_bot::types::TrackedEntity;

#[derive(Parser)]
#[command(name = "poller", about = "Announce accepted bids found on the chain explorer")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Run a single cycle per contract and exit
    #[arg(long)]
    once: bool,

    /// Log casts instead of publishing them (watermarks stay in memory)
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = AppConfig::load(&args.config)?;
    info!("Loaded config from {}", args.config.display());
    let poller_config = config
        .poller
        .clone()
        .context("config has no [poller] section")?;
    let secrets = Secrets::from_env(false)?;

    let http = reqwest::Client::new();
    let explorer = ExplorerClient::new(http.clone(), &poller_config.explorer_api_base);
    let neynar = NeynarClient::new(http, secrets.neynar_api_key, secrets.signer_uuid);
    let format = SaleFormat {
        label: poller_config.label.clone(),
        currency: config.settings.currency.clone(),
        frame_base_url: poller_config.frame_base_url.clone(),
    };
    let entities: Vec<TrackedEntity> = poller_config
        .contracts
        .iter()
        .map(|c| c.entity())
        .collect();
    let period = Duration::from_secs(config.settings.poll_interval_secs);

    info!(
        "Tracking {} contract(s) every {}s{}",
        entities.len(),
        period.as_secs(),
        if args.dry_run { " (dry-run)" } else { "" }
    );

    if args.dry_run {
        let poller = Poller::new(explorer, MemoryWatermarkStore::new(), neynar, DryRunPublisher, format);
        run(&poller, &entities, period, args.once).await;
    } else {
        let store = FileWatermarkStore::new(&config.settings.state_dir);
        info!("Watermarks in {}", store.dir().display());
        let poller = Poller::new(explorer, store, neynar.clone(), neynar, format);
        run(&poller, &entities, period, args.once).await;
    }

    Ok(())
}

/// Drive every contract's loop on this task until Ctrl+C (or one pass with `--once`).
async fn run<S, P>(
    poller: &Poller<ExplorerClient, S, NeynarClient, P>,
    entities: &[TrackedEntity],
    period: Duration,
    once: bool,
) where
    S: WatermarkStore,
    P: Publisher,
{
    if once {
        join_all(entities.iter().map(|e| poller.poll_once(e))).await;
        return;
    }

    info!("Entering polling loop. Press Ctrl+C to stop.");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = join_all(entities.iter().map(|e| poller.watch(e, period))) => {}
    }
}
