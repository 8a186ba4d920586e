//! # Tile Collector
//!
//! A concurrent tile-fetching and decoding engine for layered map renderers.
//!
//! Tile coordinates go in through a rendezvous channel; a fixed set of
//! workers fetches every layer for each coordinate, decodes the bytes into
//! pooled pixel buffers and composites them in layer order; finished tiles
//! come out through a second rendezvous channel.
//!
//! ## Features
//!
//! - **Backpressure without queues**: both channels have zero capacity, so
//!   nothing is fetched faster than the renderer draws
//! - **Buffer reuse**: decodes write into buffers recycled through a shared
//!   [`PixelBufferPool`]
//! - **Layer isolation**: a failing layer only removes itself from the tile
//! - **Cooperative cancellation**: a [`CancellationToken`](tokio_util::sync::CancellationToken)
//!   stops every worker and aborts in-flight fetches
//!
//! ## Architecture
//!
//! - [`buffer`] - pixel formats, pixel buffers and the reuse pool
//! - [`source`] - layer sources producing encoded tile bytes
//! - [`decode`] - decoding encoded tiles into pixel buffers
//! - [`tile`] - the collector, its workers and compositing
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tile_collector::{
//!     rendezvous, BufferConfiguration, FileLayerSource, Layer, PixelBufferPool, PixelFormat,
//!     TileCollector, TileCoordinate,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = BufferConfiguration::new(PixelFormat::Rgba8888, 1).unwrap();
//!     let collector = TileCollector::new(2, config, 256).unwrap();
//!     let layers = vec![Layer::new(
//!         "streets",
//!         Arc::new(FileLayerSource::new("/data/streets/{z}/{col}/{row}.png")),
//!     )];
//!
//!     let (request_tx, request_rx) = rendezvous::<TileCoordinate>();
//!     let (result_tx, result_rx) = rendezvous();
//!     drop(request_tx);
//!     drop(result_rx);
//!
//!     collector
//!         .collect_tiles(
//!             request_rx,
//!             result_tx,
//!             &layers,
//!             Arc::new(PixelBufferPool::new()),
//!             CancellationToken::new(),
//!         )
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod buffer;
pub mod config;
pub mod decode;
pub mod error;
pub mod source;
pub mod tile;

// Re-export commonly used types
pub use buffer::{BufferConfiguration, PixelBuffer, PixelBufferPool, PixelFormat, PoolStats};
pub use config::{Config, LayerSpec};
pub use decode::{DecodeFailure, ImageDecoder, TileDecoder};
pub use error::{CollectorError, ConfigError, DecodeError, FetchError};
pub use source::{FileLayerSource, Layer, LayerSource, MemoryLayerSource, TileStream};
pub use tile::{rendezvous, CollectionSummary, FinishedTile, TileCollector, TileCoordinate};
