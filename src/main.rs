//! Tile Collector - fetch, decode and composite a grid of map tiles.
//!
//! This binary wires file-backed layers to a [`TileCollector`], feeds it a
//! grid of coordinates and reports what came out.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tile_collector::{
    config::Config, rendezvous, CollectionSummary, FileLayerSource, FinishedTile, Layer,
    PixelBufferPool, PoolStats, TileCollector, TileCoordinate,
};

/// Summary printed when the run ends.
#[derive(Debug, Serialize)]
struct RunReport {
    summary: CollectionSummary,
    pool: PoolStats,
    tiles_received: u64,
    bytes_received: u64,
    elapsed_ms: u128,
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Run
// =============================================================================

async fn run(config: Config) -> Result<(), String> {
    let collector = TileCollector::with_format(
        config.workers,
        config.pixel_format,
        config.downsample,
        config.tile_size,
    )
    .map_err(|e| format!("Failed to create collector: {}", e))?;
    let buffer_config = *collector.config();

    let layers: Vec<Layer> = config
        .layers
        .iter()
        .map(|spec| {
            Layer::new(
                spec.id.as_str(),
                Arc::new(FileLayerSource::new(spec.template.clone())),
            )
            .with_opacity(spec.opacity)
        })
        .collect();

    let (rows, cols) = config.grid_dimensions();
    info!("Configuration:");
    info!("  Layers: {}", layers.len());
    for spec in &config.layers {
        info!("    {} (opacity {}) <- {}", spec.id, spec.opacity, spec.template);
    }
    info!("  Workers: {}", config.workers);
    info!(
        "  Decode: {} at 1/{} of {}px tiles ({} bytes per buffer)",
        buffer_config.pixel_format(),
        buffer_config.downsample(),
        config.tile_size,
        collector.bucket()
    );
    info!("  Grid: zoom {}, {} rows x {} cols", config.zoom, rows, cols);

    let pool = Arc::new(PixelBufferPool::new());
    let cancel = CancellationToken::new();
    let (request_tx, request_rx) = rendezvous();
    let (result_tx, result_rx) = rendezvous();

    spawn_ctrl_c_handler(cancel.clone());
    let producer = tokio::spawn(produce(config.grid(), request_tx, cancel.clone()));
    let consumer = tokio::spawn(consume(result_rx, Arc::clone(&pool), config.recycle));

    let started = Instant::now();
    let summary = collector
        .collect_tiles(request_rx, result_tx, &layers, Arc::clone(&pool), cancel)
        .await
        .map_err(|e| format!("Collection failed: {}", e))?;
    let elapsed_ms = started.elapsed().as_millis();

    if let Err(e) = producer.await {
        warn!("Request producer terminated abnormally: {}", e);
    }
    let (tiles_received, bytes_received) = consumer
        .await
        .map_err(|e| format!("Tile consumer terminated abnormally: {}", e))?;

    let report = RunReport {
        summary,
        pool: pool.stats().await,
        tiles_received,
        bytes_received,
        elapsed_ms,
    };
    print_report(&report, config.json)
}

/// Cancel the run on Ctrl-C.
fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted, cancelling collection");
                cancel.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}

/// Send every coordinate, stopping early on cancellation.
async fn produce(
    grid: impl Iterator<Item = TileCoordinate>,
    requests: flume::Sender<TileCoordinate>,
    cancel: CancellationToken,
) {
    for coord in grid {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = requests.send_async(coord) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    // Dropping the sender closes the request channel
}

/// Drain finished tiles, returning the tile count and decoded bytes seen.
async fn consume(
    results: flume::Receiver<FinishedTile>,
    pool: Arc<PixelBufferPool>,
    recycle: bool,
) -> (u64, u64) {
    let mut tiles = 0;
    let mut bytes = 0;

    while let Ok(tile) = results.recv_async().await {
        tiles += 1;
        match tile.image {
            Some(image) => {
                debug!(
                    coord = %tile.coord,
                    width = image.width(),
                    height = image.height(),
                    layers = tile.layer_ids.len(),
                    "Tile received"
                );
                bytes += image.byte_len() as u64;
                if recycle {
                    pool.put(image).await;
                }
            }
            None => debug!(coord = %tile.coord, "Empty tile received"),
        }
    }

    (tiles, bytes)
}

fn print_report(report: &RunReport, json: bool) -> Result<(), String> {
    if json {
        let output = serde_json::to_string_pretty(report)
            .map_err(|e| format!("Failed to serialize report: {}", e))?;
        println!("{}", output);
        return Ok(());
    }

    let summary = &report.summary;
    info!("");
    info!("────────────────────────────────────────────────────────────────");
    if summary.cancelled {
        warn!("  Collection cancelled");
    }
    info!(
        "  Tiles: {} emitted, {} empty, {} layer failures",
        summary.tiles_emitted, summary.empty_tiles, summary.layer_failures
    );
    info!(
        "  Received: {} tiles, {} bytes",
        report.tiles_received, report.bytes_received
    );
    info!(
        "  Pool: {} hits, {} misses, {} idle buffers ({} bytes)",
        report.pool.hits, report.pool.misses, report.pool.idle_buffers, report.pool.idle_bytes
    );
    info!("  Elapsed: {} ms", report.elapsed_ms);
    info!("────────────────────────────────────────────────────────────────");
    Ok(())
}

/// Initialize logging with the appropriate level.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tile_collector=debug"
    } else {
        "tile_collector=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
