use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use nft_cast_bot::announcer::StreamAnnouncer;
use nft_cast_bot::config::{AppConfig, CONFIG_PATH, Secrets};
use nft_cast_bot::identity::IdentityLookup;
use nft_cast_bot::neynar::NeynarClient;
use nft_cast_bot::publish::{DryRunPublisher, Publisher};
use nft_cast_bot::reporter;
use nft_cast_bot::stream::{StreamClient, StreamEvent};

#[derive(Parser)]
#[command(name = "streamer", about = "Announce marketplace sales and listings for a collection")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Log casts instead of publishing them
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
    let stream_config = config
        .stream
        .clone()
        .context("config has no [stream] section")?;
    let secrets = Secrets::from_env(true)?;
    let token = secrets
        .stream_token
        .clone()
        .context("OS_STREAM_TOKEN is not defined")?;

    let client = StreamClient::new(
        &stream_config.stream_url,
        &token,
        &stream_config.collection_slug,
        Duration::from_secs(stream_config.heartbeat_secs),
    )?;
    let neynar = NeynarClient::new(
        reqwest::Client::new(),
        secrets.neynar_api_key,
        secrets.signer_uuid,
    );

    info!(
        "Watching {} ({}){}",
        stream_config.collection_slug,
        stream_config.contract_address,
        if args.dry_run { " (dry-run)" } else { "" }
    );

    let entity = stream_config.entity();
    let contract = stream_config.contract_address.clone();
    let frame = stream_config.frame_base_url.clone();
    if args.dry_run {
        let announcer = StreamAnnouncer::new(neynar, DryRunPublisher, entity, contract, frame);
        run(&client, &announcer).await;
    } else {
        let announcer = StreamAnnouncer::new(neynar.clone(), neynar, entity, contract, frame);
        run(&client, &announcer).await;
    }

    Ok(())
}

async fn run<L: IdentityLookup, P: Publisher>(
    client: &StreamClient,
    announcer: &StreamAnnouncer<L, P>,
) {
    let on_event = move |event: StreamEvent| async move {
        if let Some(record) = announcer.handle(event).await {
            reporter::report_announcement(&record);
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = client.run(on_event) => {}
    }
}
