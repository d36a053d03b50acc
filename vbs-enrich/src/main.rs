//! vbs-enrich - episode metadata enrichment from the command line
//!
//! Enriches one or more episodes from Memory Alpha and TMDB and prints each
//! resulting record as JSON. Ctrl+C stops the batch after the current episode.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vbs_common::events::EventBus;
use vbs_enrich::{logging, EnrichmentConfig, EnrichmentOrchestrator, EpisodeRequest, MergeMode};

/// Command-line arguments for vbs-enrich
#[derive(Parser, Debug)]
#[command(name = "vbs-enrich")]
#[command(about = "Enrich episode metadata from external sources")]
#[command(version)]
struct Args {
    /// Configuration file (overrides VBS_CONFIG and the platform default)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How records from several sources are combined
    #[arg(short, long, value_enum)]
    merge: Option<MergeMode>,

    /// Episode title used as a search hint (single episode only)
    #[arg(short, long)]
    title: Option<String>,

    /// Episode ids, e.g. ent_s1_e01
    #[arg(required = true)]
    episodes: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.title.is_some() && args.episodes.len() > 1 {
        bail!("--title can only be used with a single episode");
    }

    let (filter, log_filter) = logging::filter_layer();
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = EnrichmentConfig::load(args.config.as_deref())
        .context("Failed to load enrichment configuration")?;
    log_filter
        .apply_config_level(&config.logging.level)
        .context("Failed to apply configured log level")?;
    if let Some(mode) = args.merge {
        config.merge_mode = mode;
    }

    info!(
        "Starting vbs-enrich {} ({} episodes)",
        env!("CARGO_PKG_VERSION"),
        args.episodes.len()
    );

    let event_bus = EventBus::new(100);
    let mut events = event_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            debug!(event = event.event_name(), "{:?}", event);
        }
    });

    let orchestrator = EnrichmentOrchestrator::new(config, event_bus)
        .context("Failed to initialize HTTP client")?;

    let cancel_token = CancellationToken::new();
    let ctrl_c_token = cancel_token.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping after the current episode");
            ctrl_c_token.cancel();
        }
    });

    let title = args.title;
    let requests: Vec<EpisodeRequest> = args
        .episodes
        .into_iter()
        .map(|id| match &title {
            Some(title) => EpisodeRequest::new(id).with_title(title.clone()),
            None => EpisodeRequest::new(id),
        })
        .collect();

    let report = orchestrator.enrich_batch(requests, &cancel_token).await;

    for record in &report.completed {
        println!("{}", serde_json::to_string_pretty(record)?);
    }
    for episode_id in &report.failed {
        warn!(episode_id = %episode_id, "No metadata found");
    }
    if report.cancelled {
        warn!("Batch cancelled before every episode was processed");
    }

    Ok(())
}
