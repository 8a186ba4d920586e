use thiserror::Error;

/// Errors raised by a [`LayerSource`](crate::source::LayerSource) when opening a tile stream.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The layer has no tile at the requested coordinate
    #[error("Tile not found: {0}")]
    NotFound(String),

    /// Local I/O failure while opening the tile
    #[error("I/O error: {0}")]
    Io(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Errors that can occur while decoding a tile stream into a pixel buffer.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The stream ended before yielding a single byte
    #[error("Tile stream is empty")]
    Empty,

    /// Reading the stream failed
    #[error("I/O error while reading tile stream: {0}")]
    Io(String),

    /// The bytes are not a decodable image
    #[error("Invalid image data: {message}")]
    InvalidImage { message: String },

    /// The decode task was cancelled or panicked before completing
    #[error("Decode task did not complete: {0}")]
    Cancelled(String),
}

/// Errors reported by the tile collector before any worker starts.
///
/// Failures of individual layers or tiles never surface here; they degrade
/// to tiles without an image.
#[derive(Debug, Clone, Error)]
pub enum CollectorError {
    /// A collector needs at least one worker
    #[error("Worker count must be at least 1, got {0}")]
    InvalidWorkerCount(usize),

    /// Tiles must be at least one pixel wide
    #[error("Tile size must be at least 1 pixel, got {0}")]
    InvalidTileSize(u32),

    /// Two layers in the same run share an id
    #[error("Duplicate layer id: {0}")]
    DuplicateLayer(String),

    /// Invalid buffer configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors related to buffer configuration and raw buffer construction.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Downsample factor must be at least 1
    #[error("Invalid downsample factor: {0} (must be >= 1)")]
    InvalidDownsample(u32),

    /// Raw pixel data does not match the declared dimensions and format
    #[error("Invalid buffer: expected {expected} bytes for {width}x{height}, got {actual}")]
    InvalidBuffer {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}
