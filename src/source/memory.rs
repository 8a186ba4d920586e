use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use super::{LayerSource, TileStream};
use crate::error::FetchError;
use crate::tile::TileCoordinate;

/// Layer source serving encoded tiles held in memory.
///
/// Handy for bundled assets and for exercising the collector without I/O.
/// A fallback image, when set, is served for every coordinate that has no
/// tile of its own.
#[derive(Debug, Default)]
pub struct MemoryLayerSource {
    tiles: HashMap<TileCoordinate, Bytes>,
    fallback: Option<Bytes>,
    opens: AtomicUsize,
}

impl MemoryLayerSource {
    /// Create an empty source; every open fails with `NotFound`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source serving the same image for every coordinate.
    pub fn uniform(data: impl Into<Bytes>) -> Self {
        Self {
            fallback: Some(data.into()),
            ..Self::default()
        }
    }

    /// Add a tile at a specific coordinate.
    pub fn with_tile(mut self, coord: TileCoordinate, data: impl Into<Bytes>) -> Self {
        self.tiles.insert(coord, data.into());
        self
    }

    /// Number of `open` calls served so far, successful or not.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LayerSource for MemoryLayerSource {
    async fn open(&self, coord: TileCoordinate) -> Result<TileStream, FetchError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let data = self
            .tiles
            .get(&coord)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("memory://{}", coord)))?;

        Ok(Box::pin(Cursor::new(data)))
    }
}
