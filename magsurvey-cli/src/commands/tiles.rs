//! Tile cache CLI commands.

use std::sync::Arc;

use clap::{Args, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use magsurvey::config::format_size;
use magsurvey::coord::ZoomRange;
use magsurvey::tiles::{
    DiskTileStore, DownloadProgress, DownloadSummary, HttpTileSource, ProgressCallback,
    PurgeScope, TileCacheManager,
};

use super::common::BoundsArgs;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Tile cache subcommands.
#[derive(Debug, Subcommand)]
pub enum TilesCommands {
    /// Download every tile covering an area
    Download(DownloadArgs),

    /// Remove cached tiles
    Purge {
        #[command(subcommand)]
        target: PurgeTarget,
    },

    /// Show cache statistics
    Stats,
}

/// Arguments for `tiles download`.
#[derive(Debug, Args)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub bounds: BoundsArgs,

    /// Lowest zoom level
    #[arg(long)]
    pub min_zoom: u8,

    /// Highest zoom level (defaults to --min-zoom)
    #[arg(long)]
    pub max_zoom: Option<u8>,

    /// Exempt the area from eviction while downloading
    #[arg(long)]
    pub pin: bool,

    /// How many times to retry failed tiles
    #[arg(long, default_value_t = 1)]
    pub retries: u32,
}

/// What `tiles purge` removes.
#[derive(Debug, Subcommand)]
pub enum PurgeTarget {
    /// Every cached tile
    All,
    /// Tiles intersecting an area
    Region(BoundsArgs),
}

/// Run a tiles subcommand.
pub async fn run(command: TilesCommands, runner: &CliRunner) -> Result<(), CliError> {
    let manager = open_manager(runner).await?;

    match command {
        TilesCommands::Download(args) => run_download(&manager, args).await,
        TilesCommands::Purge { target } => {
            let scope = match target {
                PurgeTarget::All => PurgeScope::All,
                PurgeTarget::Region(bounds) => PurgeScope::Region(bounds.to_bbox()?),
            };
            let removed = manager.purge(scope).await?;
            println!("Removed {} tiles", removed);
            Ok(())
        }
        TilesCommands::Stats => {
            let stats = manager.stats();
            let directory = runner.config().tiles.directory.display().to_string();
            println!("Tile cache: {}", directory);
            println!("  Tiles: {}", stats.cached);
            println!(
                "  Size:  {} of {}",
                format_size(stats.cached_bytes),
                format_size(stats.max_size_bytes)
            );
            Ok(())
        }
    }
}

async fn open_manager(runner: &CliRunner) -> Result<TileCacheManager, CliError> {
    let config = runner.config().tile_cache_config();
    let store = Arc::new(DiskTileStore::new(runner.config().tiles.directory.clone()));
    let source = Arc::new(HttpTileSource::new(&config)?);
    Ok(TileCacheManager::open(config, source, store).await?)
}

async fn run_download(manager: &TileCacheManager, args: DownloadArgs) -> Result<(), CliError> {
    let bbox = args.bounds.to_bbox()?;
    let zooms = ZoomRange::new(args.min_zoom, args.max_zoom.unwrap_or(args.min_zoom))
        .map_err(|e| CliError::InvalidArgument(e.to_string()))?;

    let total = manager.plan_download(bbox, zooms).tile_count();
    println!(
        "Downloading {} tiles (zoom {}-{}) into {}",
        total,
        zooms.min,
        zooms.max,
        manager
            .config()
            .directory
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "memory".to_string())
    );

    if args.pin {
        manager.pin_region(bbox);
    }

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Cancelling, in-flight tiles stay pending...");
                cancel.cancel();
            }
        })
    };

    let bar = progress_bar(total);
    let mut summary = manager
        .download(bbox, zooms, &cancel, Some(progress_callback(&bar)))
        .await;
    bar.finish_and_clear();

    for attempt in 1..=args.retries {
        if summary.failed == 0 || cancel.is_cancelled() {
            break;
        }
        warn!(attempt, failed = summary.failed, "Retrying failed tiles");
        let retry_bar = progress_bar(summary.failed);
        let retry = manager
            .retry_failed(&cancel, Some(progress_callback(&retry_bar)))
            .await;
        retry_bar.finish_and_clear();
        summary = merge_retry(summary, retry);
    }
    ctrl_c.abort();

    println!("{}", summary);
    if summary.is_complete() {
        Ok(())
    } else {
        Err(CliError::IncompleteDownload {
            missing: summary.failed + summary.pending,
        })
    }
}

/// Folds a retry pass into the original summary.
fn merge_retry(original: DownloadSummary, retry: DownloadSummary) -> DownloadSummary {
    DownloadSummary {
        already_cached: original.already_cached,
        newly_cached: original.newly_cached + retry.newly_cached + retry.already_cached,
        failed: retry.failed,
        pending: original.pending + retry.pending,
    }
}

fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{msg} {wide_bar:.cyan/dim} {pos}/{len} [{eta}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    bar.set_message("tiles");
    bar
}

fn progress_callback(bar: &ProgressBar) -> ProgressCallback {
    let bar = bar.clone();
    Arc::new(move |progress: DownloadProgress| bar.set_position(progress.completed))
}
