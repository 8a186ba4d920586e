//! Tile collection.
//!
//! This module turns a stream of tile coordinates into composited,
//! ready-to-draw tiles.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Request producer               │
//! └────────────────────┬────────────────────┘
//!                      │ TileCoordinate (rendezvous)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             TileCollector               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ N workers    │  │ per-layer fetch │  │
//! │  │ (fixed)      │  │ + decode tasks  │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │ FinishedTile (rendezvous)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Renderer                   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileCollector`]: runs the workers of one collection
//! - [`TileCoordinate`]: zoom, row and column of a request
//! - [`FinishedTile`]: composited image for one coordinate
//! - [`CollectionSummary`]: counters reported when a run ends
//! - [`rendezvous`]: zero-capacity channel constructor for both ends

mod collector;
mod composite;
mod coordinate;

pub use collector::{rendezvous, CollectionSummary, TileCollector};
pub use coordinate::{FinishedTile, TileCoordinate};
