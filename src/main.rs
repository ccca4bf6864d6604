use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use carousel::api::CarouselServer;
use carousel::blacklist::{self, Blacklist, NoopBlacklist};
use carousel::cluster::{GtgPoller, GtgService, PublishGate};
use carousel::config::{parse_duration, CarouselConfig};
use carousel::native::InMemoryNativeStore;
use carousel::notifications::{HttpNotifier, NativeContentPublishTask};
use carousel::scheduler::CarouselScheduler;
use carousel::storage::FileMetadataStore;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "carousel",
    version,
    about = "Continuously republishes content from the native store",
    long_about = None
)]
struct Cli {
    /// Path to the YAML cycle configuration file
    #[arg(long, default_value = "./cycles.yml")]
    cycles: PathBuf,

    /// Directory for cycle metadata checkpoints
    #[arg(long, default_value = "./carousel-state")]
    state_dir: PathBuf,

    /// Bind address for the control surface
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Downstream notification endpoint
    #[arg(long, default_value = "http://localhost:13080/notify")]
    notifier_url: String,

    /// Optional file of blacklisted uuids, one per line
    #[arg(long)]
    blacklist_file: Option<PathBuf>,

    /// Comma-separated good-to-go URLs gating publishing
    #[arg(long, value_delimiter = ',')]
    gtg_urls: Vec<String>,

    /// Interval between good-to-go checks
    #[arg(long, default_value = "30s")]
    gtg_interval: String,

    /// Interval between metadata checkpoints
    #[arg(long, default_value = "1m")]
    checkpoint_interval: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, default_value = "text")]
    log_format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    tracing::info!("starting the publish carousel");

    let config = CarouselConfig::from_file(&cli.cycles)
        .with_context(|| format!("failed to load cycle config {}", cli.cycles.display()))?;

    let checkpoint_interval = parse_duration(&cli.checkpoint_interval)
        .map_err(anyhow::Error::msg)
        .context("invalid checkpoint interval")?;
    let gtg_interval = parse_duration(&cli.gtg_interval)
        .map_err(anyhow::Error::msg)
        .context("invalid gtg interval")?;

    // the bundled in-memory store backs local runs; a deployment wires its
    // own NativeStore implementation here
    let store = Arc::new(InMemoryNativeStore::new());

    let notifier = Arc::new(HttpNotifier::new(cli.notifier_url.clone())?);
    let task = Arc::new(NativeContentPublishTask::new(store.clone(), notifier));

    let blacklist: Arc<dyn Blacklist> = match &cli.blacklist_file {
        Some(path) => Arc::new(
            blacklist::Builder::new()
                .file_based(path)
                .build()
                .context("failed to build the blacklist")?,
        ),
        None => Arc::new(NoopBlacklist),
    };

    let metadata_store = Arc::new(FileMetadataStore::new(&cli.state_dir)?);
    let gate = PublishGate::always_open();

    let scheduler = Arc::new(CarouselScheduler::new(
        store,
        task,
        blacklist,
        metadata_store,
        gate.clone(),
    ));

    scheduler
        .apply_config(&config)
        .await
        .context("failed to apply cycle configuration")?;

    let poller_cancel = CancellationToken::new();
    if !cli.gtg_urls.is_empty() {
        let services = cli
            .gtg_urls
            .iter()
            .map(|url| GtgService {
                name: url.clone(),
                url: url.clone(),
            })
            .collect();
        GtgPoller::new(services, gtg_interval, gate.clone()).spawn(poller_cancel.clone());
        scheduler.start_gate_watcher();
    }

    scheduler.restore_previous_state().await;
    scheduler.start_checkpointing(checkpoint_interval);
    scheduler.start().await;

    let server = CarouselServer::new(scheduler.clone(), cli.bind);
    server
        .start_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received shutdown signal");
        })
        .await?;

    poller_cancel.cancel();
    scheduler.shutdown().await;

    tracing::info!("carousel stopped");
    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("carousel=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("carousel=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}
