//! Tile collector: a fixed pool of workers turning tile requests into
//! finished tiles.
//!
//! # Architecture
//!
//! ```text
//!  visibility ──► [rendezvous] ──► worker 0 ┐
//!                      │                    │
//!                      ├─────────► worker 1 ├──► [rendezvous] ──► renderer
//!                      │                    │                        │
//!                      └─────────► worker N ┘                        │
//!                                    │  ▲                            │
//!                           get/put  ▼  │                            │ put
//!                            ┌──────────────────┐                    │
//!                            │ PixelBufferPool  │◄───────────────────┘
//!                            └──────────────────┘
//! ```
//!
//! For each request a worker:
//! 1. Spawns one fetch+decode task per layer
//! 2. Waits for every layer to succeed or fail
//! 3. Composites the contributions in layer order
//! 4. Sends the tile, blocking until the renderer takes it
//!
//! Both channels have zero capacity, so a slow renderer stalls the workers
//! and stalled workers stall the producer. That is the only overload control.
//!
//! # Cancellation
//!
//! Every suspension point of a worker races against the run's
//! [`CancellationToken`]. Receiving and processing check cancellation first;
//! delivery checks the send first, so a tile the renderer already took is
//! always counted. Once a worker sees the token cancelled it sends nothing
//! more, and dropping its per-tile [`JoinSet`] aborts any fetch or decode
//! still in flight.

use std::collections::HashSet;
use std::sync::Arc;

use flume::{Receiver, Sender};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::buffer::{BufferConfiguration, PixelBuffer, PixelBufferPool, PixelFormat};
use crate::decode::{ImageDecoder, TileDecoder};
use crate::error::CollectorError;
use crate::source::{Layer, LayerSource};

use super::composite::{composite, Contribution};
use super::coordinate::{FinishedTile, TileCoordinate};

/// Create a zero-capacity channel: a send completes only when a receiver
/// takes the value.
pub fn rendezvous<T>() -> (Sender<T>, Receiver<T>) {
    flume::bounded(0)
}

// =============================================================================
// Collection Summary
// =============================================================================

/// Counters describing one collection run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    /// Tiles handed to the renderer
    pub tiles_emitted: u64,

    /// Emitted tiles that had no image
    pub empty_tiles: u64,

    /// Layer attempts that failed to fetch or decode
    pub layer_failures: u64,

    /// Whether the run ended because it was cancelled
    pub cancelled: bool,
}

impl CollectionSummary {
    fn merge(&mut self, other: &CollectionSummary) {
        self.tiles_emitted += other.tiles_emitted;
        self.empty_tiles += other.empty_tiles;
        self.layer_failures += other.layer_failures;
    }
}

// =============================================================================
// Tile Collector
// =============================================================================

/// Fetches, decodes and composites tiles with a fixed number of workers.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tile_collector::buffer::{BufferConfiguration, PixelBufferPool, PixelFormat};
/// use tile_collector::source::{FileLayerSource, Layer};
/// use tile_collector::tile::{rendezvous, FinishedTile, TileCollector, TileCoordinate};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let config = BufferConfiguration::new(PixelFormat::Rgb565, 2).unwrap();
///     let collector = TileCollector::new(4, config, 256).unwrap();
///     let layers = vec![Layer::new(
///         "base",
///         Arc::new(FileLayerSource::new("tiles/{z}/{row}/{col}.jpg")),
///     )];
///
///     let (request_tx, request_rx) = rendezvous();
///     let (result_tx, result_rx) = rendezvous::<FinishedTile>();
///     let pool = Arc::new(PixelBufferPool::new());
///
///     tokio::spawn(async move {
///         request_tx.send_async(TileCoordinate::new(0, 0, 0)).await.ok();
///     });
///     tokio::spawn(async move {
///         while let Ok(tile) = result_rx.recv_async().await {
///             println!("tile {} ready", tile.coord);
///         }
///     });
///
///     let summary = collector
///         .collect_tiles(request_rx, result_tx, &layers, pool, CancellationToken::new())
///         .await
///         .unwrap();
///     println!("{} tiles", summary.tiles_emitted);
/// }
/// ```
pub struct TileCollector<D = ImageDecoder> {
    worker_count: usize,
    config: BufferConfiguration,
    tile_size: u32,
    decoder: Arc<D>,
}

impl TileCollector<ImageDecoder> {
    /// Create a collector using the default [`ImageDecoder`].
    pub fn new(
        worker_count: usize,
        config: BufferConfiguration,
        tile_size: u32,
    ) -> Result<Self, CollectorError> {
        Self::with_decoder(worker_count, config, tile_size, ImageDecoder::new())
    }

    /// Create a collector from a raw pixel format and downsample factor.
    ///
    /// # Errors
    ///
    /// Fails on a zero downsample factor as well as on anything
    /// [`new`](Self::new) rejects.
    pub fn with_format(
        worker_count: usize,
        pixel_format: PixelFormat,
        downsample: u32,
        tile_size: u32,
    ) -> Result<Self, CollectorError> {
        let config = BufferConfiguration::new(pixel_format, downsample)?;
        Self::new(worker_count, config, tile_size)
    }
}

impl<D: TileDecoder + 'static> TileCollector<D> {
    /// Create a collector with a custom decoder.
    ///
    /// # Errors
    ///
    /// Fails when `worker_count` or `tile_size` is zero.
    pub fn with_decoder(
        worker_count: usize,
        config: BufferConfiguration,
        tile_size: u32,
        decoder: D,
    ) -> Result<Self, CollectorError> {
        if worker_count == 0 {
            return Err(CollectorError::InvalidWorkerCount(worker_count));
        }
        if tile_size == 0 {
            return Err(CollectorError::InvalidTileSize(tile_size));
        }
        Ok(Self {
            worker_count,
            config,
            tile_size,
            decoder: Arc::new(decoder),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn config(&self) -> &BufferConfiguration {
        &self.config
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Pool bucket every decode of this collector asks for.
    pub fn bucket(&self) -> usize {
        self.config.bucket_for(self.tile_size)
    }

    /// Run the workers until `requests` is closed or `cancel` fires.
    ///
    /// Starts exactly [`worker_count`](Self::worker_count) workers and returns
    /// only once all of them have stopped. Failing layers never abort the run;
    /// a tile for which every layer failed is emitted without an image.
    ///
    /// The pool may be shared with the renderer and reused across runs.
    /// Emitted images are never returned to it automatically.
    ///
    /// Dropping the returned future aborts every worker.
    ///
    /// # Errors
    ///
    /// Fails before starting any worker if two layers share an id.
    pub async fn collect_tiles(
        &self,
        requests: Receiver<TileCoordinate>,
        results: Sender<FinishedTile>,
        layers: &[Layer],
        pool: Arc<PixelBufferPool>,
        cancel: CancellationToken,
    ) -> Result<CollectionSummary, CollectorError> {
        let mut seen = HashSet::new();
        for layer in layers {
            if !seen.insert(layer.id()) {
                return Err(CollectorError::DuplicateLayer(layer.id().to_string()));
            }
        }

        let context = Arc::new(WorkerContext {
            layers: layers.to_vec().into(),
            pool,
            decoder: Arc::clone(&self.decoder),
            config: self.config,
            bucket: self.bucket(),
            cancel,
        });

        info!(
            workers = self.worker_count,
            layers = layers.len(),
            bucket = context.bucket,
            "Starting tile collection"
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..self.worker_count {
            workers.spawn(run_worker(
                worker_id,
                Arc::clone(&context),
                requests.clone(),
                results.clone(),
            ));
        }

        // Only the workers may keep the channels alive from here on
        drop(requests);
        drop(results);

        let mut summary = CollectionSummary::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(stats) => summary.merge(&stats),
                Err(e) => warn!(error = %e, "Tile worker terminated abnormally"),
            }
        }
        summary.cancelled = context.cancel.is_cancelled();

        info!(
            tiles = summary.tiles_emitted,
            empty = summary.empty_tiles,
            layer_failures = summary.layer_failures,
            cancelled = summary.cancelled,
            "Tile collection finished"
        );

        Ok(summary)
    }
}

// =============================================================================
// Worker
// =============================================================================

/// Immutable state shared by the workers of one run.
struct WorkerContext<D> {
    layers: Arc<[Layer]>,
    pool: Arc<PixelBufferPool>,
    decoder: Arc<D>,
    config: BufferConfiguration,
    bucket: usize,
    cancel: CancellationToken,
}

async fn run_worker<D: TileDecoder + 'static>(
    worker_id: usize,
    context: Arc<WorkerContext<D>>,
    requests: Receiver<TileCoordinate>,
    results: Sender<FinishedTile>,
) -> CollectionSummary {
    let mut stats = CollectionSummary::default();
    let cancel = &context.cancel;
    debug!(worker_id, "Tile worker started");

    loop {
        let coord = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            request = requests.recv_async() => match request {
                Ok(coord) => coord,
                Err(_) => break,
            },
        };

        let (tile, failures) = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            processed = context.process(coord) => processed,
        };
        stats.layer_failures += failures;

        if cancel.is_cancelled() {
            break;
        }

        // Delivery is polled first: a tile the renderer already took counts as
        // emitted, a pending one loses to cancellation
        let empty = tile.is_empty();
        tokio::select! {
            biased;
            sent = results.send_async(tile) => match sent {
                Ok(()) => {
                    stats.tiles_emitted += 1;
                    if empty {
                        stats.empty_tiles += 1;
                    }
                }
                Err(flume::SendError(tile)) => {
                    debug!(worker_id, coord = %tile.coord, "Result channel closed");
                    if let Some(image) = tile.image {
                        context.pool.put(image).await;
                    }
                    break;
                }
            },
            _ = cancel.cancelled() => break,
        }
    }

    debug!(
        worker_id,
        tiles = stats.tiles_emitted,
        "Tile worker stopped"
    );
    stats
}

impl<D: TileDecoder + 'static> WorkerContext<D> {
    /// Fetch, decode and composite every layer for `coord`.
    ///
    /// Returns the tile and the number of layers that failed.
    async fn process(&self, coord: TileCoordinate) -> (FinishedTile, u64) {
        let downsample = self.config.downsample();
        if self.layers.is_empty() {
            return (FinishedTile::empty(coord, downsample), 0);
        }

        let mut fetches = JoinSet::new();
        for (index, layer) in self.layers.iter().enumerate() {
            let source = Arc::clone(layer.source());
            let layer_id = layer.shared_id();
            let decoder = Arc::clone(&self.decoder);
            let pool = Arc::clone(&self.pool);
            let config = self.config;
            let bucket = self.bucket;

            fetches.spawn(async move {
                let buffer = fetch_layer(
                    coord,
                    &layer_id,
                    source.as_ref(),
                    decoder.as_ref(),
                    &pool,
                    &config,
                    bucket,
                )
                .await;
                (index, buffer)
            });
        }

        // Fan-in: the tile waits for every layer to settle
        let mut decoded: Vec<Option<PixelBuffer>> = self.layers.iter().map(|_| None).collect();
        let mut failures = 0;
        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok((index, Some(buffer))) => decoded[index] = Some(buffer),
                Ok((_, None)) => failures += 1,
                Err(e) => {
                    warn!(coord = %coord, error = %e, "Layer task terminated abnormally");
                    failures += 1;
                }
            }
        }

        let contributions = self
            .layers
            .iter()
            .zip(decoded)
            .filter_map(|(layer, buffer)| {
                buffer.map(|buffer| Contribution {
                    id: layer.shared_id(),
                    opacity: layer.opacity(),
                    buffer,
                })
            })
            .collect();

        let composite = composite(contributions);
        for spare in composite.spare {
            self.pool.put(spare).await;
        }

        let tile = FinishedTile {
            coord,
            image: composite.image,
            downsample,
            layer_ids: composite.layer_ids,
        };
        (tile, failures)
    }
}

/// Open and decode one layer of one tile.
///
/// Returns `None` when the layer contributes nothing.
async fn fetch_layer<D: TileDecoder + ?Sized>(
    coord: TileCoordinate,
    layer_id: &str,
    source: &dyn LayerSource,
    decoder: &D,
    pool: &PixelBufferPool,
    config: &BufferConfiguration,
    bucket: usize,
) -> Option<PixelBuffer> {
    let stream = match source.open(coord).await {
        Ok(stream) => stream,
        Err(e) => {
            debug!(coord = %coord, layer = layer_id, error = %e, "Layer fetch failed");
            return None;
        }
    };

    let reuse = pool.get(bucket).await;
    match decoder.decode(stream, config, reuse).await {
        Ok(buffer) => Some(buffer),
        Err(failure) => {
            debug!(
                coord = %coord,
                layer = layer_id,
                error = %failure.error,
                "Layer decode failed"
            );
            if let Some(buffer) = failure.reclaimed {
                pool.put(buffer).await;
            }
            None
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
