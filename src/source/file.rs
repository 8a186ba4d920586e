use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;

use super::{LayerSource, TileStream};
use crate::error::FetchError;
use crate::tile::TileCoordinate;

/// Layer source reading tiles from the local filesystem.
///
/// The path of each tile is built from a template in which `{z}`, `{row}` and
/// `{col}` are substituted, e.g. `tiles/{z}/{row}/{col}.jpg`.
#[derive(Debug, Clone)]
pub struct FileLayerSource {
    template: String,
}

impl FileLayerSource {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Path of the tile at `coord`.
    pub fn path_for(&self, coord: TileCoordinate) -> PathBuf {
        PathBuf::from(
            self.template
                .replace("{z}", &coord.zoom.to_string())
                .replace("{row}", &coord.row.to_string())
                .replace("{col}", &coord.col.to_string()),
        )
    }
}

#[async_trait]
impl LayerSource for FileLayerSource {
    async fn open(&self, coord: TileCoordinate) -> Result<TileStream, FetchError> {
        let path = self.path_for(coord);
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::pin(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(FetchError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(FetchError::Io(format!("{}: {}", path.display(), e))),
        }
    }
}
