//! Layer sources.
//!
//! A [`LayerSource`] turns a tile coordinate into a readable byte stream. The
//! collector never cares where the bytes come from; network, disk and bundled
//! assets all sit behind the same trait.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │                 Layer                    │
//! │   id + opacity + Arc<dyn LayerSource>    │
//! └────────────────────┬─────────────────────┘
//!                      │ open(coord)
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │ FileLayerSource │    │ MemoryLayerSource   │
//! │ (path template) │    │ (in-memory tiles)   │
//! └─────────────────┘    └─────────────────────┘
//! ```

mod file;
mod memory;

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::FetchError;
use crate::tile::TileCoordinate;

pub use file::FileLayerSource;
pub use memory::MemoryLayerSource;

/// Readable byte stream for one tile of one layer.
pub type TileStream = Pin<Box<dyn AsyncRead + Send>>;

/// Provider of raw tile bytes for one map layer.
///
/// Implementations must be thread-safe; the collector opens streams for the
/// same source from many tasks at once. Timeouts are the implementation's
/// business, the collector never imposes one.
#[async_trait]
pub trait LayerSource: Send + Sync {
    /// Open a stream of the encoded image stored at `coord`.
    async fn open(&self, coord: TileCoordinate) -> Result<TileStream, FetchError>;
}

/// One named source of imagery, composited in order into a tile.
#[derive(Clone)]
pub struct Layer {
    id: Arc<str>,
    source: Arc<dyn LayerSource>,
    opacity: f32,
}

impl Layer {
    /// Create a fully opaque layer.
    pub fn new(id: impl Into<Arc<str>>, source: Arc<dyn LayerSource>) -> Self {
        Self {
            id: id.into(),
            source,
            opacity: 1.0,
        }
    }

    /// Set the layer opacity, clamped to `[0, 1]`.
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = if opacity.is_nan() {
            1.0
        } else {
            opacity.clamp(0.0, 1.0)
        };
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn shared_id(&self) -> Arc<str> {
        Arc::clone(&self.id)
    }

    pub fn source(&self) -> &Arc<dyn LayerSource> {
        &self.source
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("opacity", &self.opacity)
            .finish_non_exhaustive()
    }
}
