//! Configuration for the tile collector binary.
//!
//! This module provides the command-line configuration, which supports:
//! - Command-line arguments via clap
//! - Environment variables with `TILE_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use tile_collector::config::Config;
//!
//! // Parse from command line and environment
//! let config = Config::parse();
//!
//! println!("{} workers, {} layers", config.workers, config.layers.len());
//! ```
//!
//! # Environment Variables
//!
//! - `TILE_LAYERS` - Comma-separated layer specs `id[:opacity]=template`
//! - `TILE_WORKERS` - Number of workers (default: 4)
//! - `TILE_SIZE` - Source tile size in pixels (default: 256)
//! - `TILE_PIXEL_FORMAT` - rgba8888, rgb565 or luma8 (default: rgba8888)
//! - `TILE_DOWNSAMPLE` - Downsample factor (default: 1)
//! - `TILE_ZOOM` - Zoom level to collect (default: 0)
//! - `TILE_ROWS` / `TILE_COLS` - Grid size (default: 2^zoom)

use std::collections::HashSet;

use clap::Parser;

use crate::buffer::PixelFormat;
use crate::tile::TileCoordinate;

// =============================================================================
// Default Values
// =============================================================================

/// Default number of workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Default source tile size in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Highest zoom level the binary accepts.
pub const MAX_ZOOM: u32 = 24;

// =============================================================================
// Layer Spec
// =============================================================================

/// A layer given on the command line as `id[:opacity]=template`.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub id: String,
    pub opacity: f32,
    pub template: String,
}

/// Parse a `id[:opacity]=template` layer argument.
pub fn parse_layer_spec(s: &str) -> Result<LayerSpec, String> {
    let (name, template) = s
        .split_once('=')
        .ok_or_else(|| format!("expected id=template, got '{}'", s))?;

    let (id, opacity) = match name.split_once(':') {
        Some((id, opacity)) => {
            let opacity: f32 = opacity
                .parse()
                .map_err(|_| format!("invalid opacity '{}'", opacity))?;
            if !(0.0..=1.0).contains(&opacity) {
                return Err(format!("opacity must be between 0 and 1, got {}", opacity));
            }
            (id, opacity)
        }
        None => (name, 1.0),
    };

    if id.is_empty() {
        return Err("layer id must not be empty".to_string());
    }
    if template.is_empty() {
        return Err(format!("layer '{}' has an empty path template", id));
    }

    Ok(LayerSpec {
        id: id.to_string(),
        opacity,
        template: template.to_string(),
    })
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tile Collector - fetch, decode and composite a grid of map tiles.
///
/// Reads every layer of every tile in the grid from disk, composites the
/// layers in the order given, and reports what was collected.
#[derive(Parser, Debug, Clone)]
#[command(name = "tile-collector")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Layers
    // =========================================================================
    /// Layer as `id[:opacity]=template`, bottom layer first.
    ///
    /// The template may contain `{z}`, `{row}` and `{col}` placeholders.
    #[arg(
        short,
        long = "layer",
        env = "TILE_LAYERS",
        value_delimiter = ',',
        value_parser = parse_layer_spec
    )]
    pub layers: Vec<LayerSpec>,

    // =========================================================================
    // Collector Configuration
    // =========================================================================
    /// Number of concurrent workers.
    #[arg(short, long, default_value_t = DEFAULT_WORKERS, env = "TILE_WORKERS")]
    pub workers: usize,

    /// Edge length of a source tile in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "TILE_SIZE")]
    pub tile_size: u32,

    /// Pixel format of decoded tiles.
    #[arg(long, value_enum, default_value_t = PixelFormat::Rgba8888, env = "TILE_PIXEL_FORMAT")]
    pub pixel_format: PixelFormat,

    /// Factor by which decoded tiles are shrunk.
    #[arg(long, default_value_t = 1, env = "TILE_DOWNSAMPLE")]
    pub downsample: u32,

    // =========================================================================
    // Grid
    // =========================================================================
    /// Zoom level to collect.
    #[arg(short, long, default_value_t = 0, env = "TILE_ZOOM")]
    pub zoom: u32,

    /// Number of rows to collect (default: 2^zoom).
    #[arg(long, env = "TILE_ROWS")]
    pub rows: Option<u32>,

    /// Number of columns to collect (default: 2^zoom).
    #[arg(long, env = "TILE_COLS")]
    pub cols: Option<u32>,

    // =========================================================================
    // Output
    // =========================================================================
    /// Return rendered tiles to the buffer pool.
    #[arg(long, default_value_t = false)]
    pub recycle: bool,

    /// Print the run report as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.layers.is_empty() {
            return Err("At least one layer is required. Set --layer or TILE_LAYERS".to_string());
        }

        let mut ids = HashSet::new();
        for layer in &self.layers {
            if !ids.insert(layer.id.as_str()) {
                return Err(format!("Layer id '{}' is given more than once", layer.id));
            }
        }

        if self.workers == 0 {
            return Err("workers must be greater than 0".to_string());
        }
        if self.tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }
        if self.downsample == 0 {
            return Err("downsample must be greater than 0".to_string());
        }
        if self.zoom > MAX_ZOOM {
            return Err(format!("zoom must be at most {}", MAX_ZOOM));
        }

        let (rows, cols) = self.grid_dimensions();
        if rows == 0 || cols == 0 {
            return Err("rows and cols must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Rows and columns of the grid to collect.
    pub fn grid_dimensions(&self) -> (u32, u32) {
        let side = 1u32.checked_shl(self.zoom).unwrap_or(u32::MAX);
        (self.rows.unwrap_or(side), self.cols.unwrap_or(side))
    }

    /// Every coordinate of the grid, row by row.
    pub fn grid(&self) -> impl Iterator<Item = TileCoordinate> {
        let zoom = self.zoom;
        let (rows, cols) = self.grid_dimensions();
        (0..rows).flat_map(move |row| (0..cols).map(move |col| TileCoordinate::new(zoom, row, col)))
    }
}

// =============================================================================
// Tests
// =============================================================================
