//! Tile decoding.
//!
//! The collector only relies on the [`TileDecoder`] contract: turn a byte
//! stream into a [`PixelBuffer`] matching a [`BufferConfiguration`],
//! optionally reusing a pooled buffer. [`ImageDecoder`] is the default
//! implementation built on the `image` crate.

mod image_decoder;

use async_trait::async_trait;

use crate::buffer::{BufferConfiguration, PixelBuffer};
use crate::error::DecodeError;
use crate::source::TileStream;

pub use image_decoder::ImageDecoder;

/// A failed decode.
///
/// The reuse buffer handed to the decoder comes back in `reclaimed` so the
/// caller can return it to the pool.
#[derive(Debug)]
pub struct DecodeFailure {
    pub error: DecodeError,
    pub reclaimed: Option<PixelBuffer>,
}

impl DecodeFailure {
    pub fn new(error: DecodeError, reclaimed: Option<PixelBuffer>) -> Self {
        Self { error, reclaimed }
    }
}

/// Decodes encoded tile bytes into pixel buffers.
#[async_trait]
pub trait TileDecoder: Send + Sync {
    /// Decode `stream` into a buffer laid out as `config` requires.
    ///
    /// When `reuse` is given the decoder writes into it instead of allocating.
    /// A stream that yields no bytes is a decode failure.
    async fn decode(
        &self,
        stream: TileStream,
        config: &BufferConfiguration,
        reuse: Option<PixelBuffer>,
    ) -> Result<PixelBuffer, DecodeFailure>;
}
