use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;

/// Position of one tile request in the map pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoordinate {
    /// Zoom level (0 = most zoomed out)
    pub zoom: u32,

    /// Tile row (0-indexed from top)
    pub row: u32,

    /// Tile column (0-indexed from left)
    pub col: u32,
}

impl TileCoordinate {
    pub fn new(zoom: u32, row: u32, col: u32) -> Self {
        Self { zoom, row, col }
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.row, self.col)
    }
}

/// A tile ready for rendering.
///
/// `image` is `None` when no layer produced anything for this coordinate.
/// That means "nothing to draw", not an error.
///
/// The consumer owns `image` and decides whether it goes back to the
/// [`PixelBufferPool`](crate::buffer::PixelBufferPool) once drawn.
#[derive(Debug)]
pub struct FinishedTile {
    pub coord: TileCoordinate,
    pub image: Option<PixelBuffer>,

    /// Downsample factor the image was decoded with
    pub downsample: u32,

    /// Ids of the layers drawn into `image`, bottom first
    pub layer_ids: Vec<Arc<str>>,
}

impl FinishedTile {
    /// A tile without visual content.
    pub fn empty(coord: TileCoordinate, downsample: u32) -> Self {
        Self {
            coord,
            image: None,
            downsample,
            layer_ids: Vec::new(),
        }
    }

    /// Check if the tile has no image.
    pub fn is_empty(&self) -> bool {
        self.image.is_none()
    }
}
