use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nearcast_client::commands::{parse_line, Input};
use nearcast_client::{FeedDriver, HttpPostFetcher, PushHub, TracingSurface, ViewerCommand};
use nearcast_common::{load_config, Config, FileConfig};
use nearcast_map::{MapFeed, ZoomContext};

#[derive(Parser)]
#[command(name = "nearcast", about = "Live nearby-posts map feed, driven from stdin")]
struct Cli {
    /// Starting latitude
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    /// Starting longitude
    #[arg(long, allow_hyphen_values = true)]
    lng: f64,

    /// Starting zoom level
    #[arg(long, default_value_t = 13.0)]
    zoom: f64,

    /// Map tuning TOML; overrides NEARCAST_CONFIG
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("nearcast=info".parse()?);
    if cli.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("nearcast starting");

    let config = Config::from_env()?;
    config.log_redacted();

    let file_config = match cli.config.as_ref().or(config.config_path.as_ref()) {
        Some(path) => load_config(path)?,
        None => FileConfig::default(),
    };

    let fetcher = HttpPostFetcher::from_config(&config, &file_config.fetch)
        .context("Failed to set up post fetcher")?;
    let feed = MapFeed::from_config(TracingSurface::new(), ZoomContext::new(cli.zoom), &file_config);

    let mut driver = FeedDriver::builder()
        .feed(feed)
        .fetcher(Arc::new(fetcher))
        .motion(file_config.motion.clone())
        .fetch(file_config.fetch.clone())
        .build();

    let hub = PushHub::new();
    let push_rx = hub.subscribe();
    let (tx, rx) = mpsc::channel::<ViewerCommand>(64);

    tx.send(ViewerCommand::Move { lat: cli.lat, lng: cli.lng })
        .await
        .context("Driver input closed")?;

    // Ctrl-C stops the driver like `quit`.
    let ctrl_c_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_c_tx.send(ViewerCommand::Shutdown).await;
        }
    });

    tokio::spawn(read_stdin(tx, hub));

    let stats = driver.run(rx, push_rx).await;
    info!(
        fetches = stats.fetches_issued,
        applied = stats.fetches_applied,
        stale = stats.fetches_stale,
        failed = stats.fetches_failed,
        "nearcast stopped"
    );
    Ok(())
}

/// Forward stdin lines to the driver until EOF or `quit`.
async fn read_stdin(tx: mpsc::Sender<ViewerCommand>, hub: PushHub) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        };

        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(Input::Push(signal))) => {
                hub.notify(signal);
            }
            Ok(Some(Input::Viewer(command))) => {
                let stop = command == ViewerCommand::Shutdown;
                if tx.send(command).await.is_err() || stop {
                    return;
                }
            }
            Err(e) => warn!(error = %e, "Ignoring input line"),
        }
    }
    let _ = tx.send(ViewerCommand::Shutdown).await;
}
