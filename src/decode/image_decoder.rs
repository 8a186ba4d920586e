//! Default tile decoder built on the `image` crate.
//!
//! # Design Decisions
//!
//! - **Read, then decode**: the stream is drained asynchronously, then decoded
//!   on the blocking thread pool so CPU-heavy work never stalls the runtime.
//!
//! - **Format sniffing**: the container format is guessed from the magic bytes,
//!   so one decoder handles JPEG and PNG layers alike.
//!
//! - **Downsampling**: the decoded image is shrunk by the configured factor
//!   with a triangle filter, never below one pixel per side.

use std::io::Cursor;

use async_trait::async_trait;
use image::imageops::FilterType;
use image::{ImageReader, RgbaImage};
use tokio::io::AsyncReadExt;

use super::{DecodeFailure, TileDecoder};
use crate::buffer::{BufferConfiguration, PixelBuffer, PixelFormat};
use crate::error::DecodeError;
use crate::source::TileStream;

/// Decoder for JPEG and PNG tiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder {
    // Stateless; decoding settings come from the BufferConfiguration
}

impl ImageDecoder {
    /// Create a new image decoder.
    pub fn new() -> Self {
        Self {}
    }

    /// Decode an in-memory encoded image.
    ///
    /// This is the synchronous core of [`TileDecoder::decode`].
    pub fn decode_bytes(
        &self,
        source: &[u8],
        config: &BufferConfiguration,
        reuse: Option<PixelBuffer>,
    ) -> Result<PixelBuffer, DecodeFailure> {
        let rgba = match self.decode_rgba(source, config) {
            Ok(rgba) => rgba,
            Err(error) => return Err(DecodeFailure::new(error, reuse)),
        };

        let (width, height) = rgba.dimensions();
        let format = config.pixel_format();
        let mut buffer = match reuse {
            Some(mut buffer) => {
                buffer.reshape(width, height, format);
                buffer
            }
            None => PixelBuffer::allocate(width, height, format),
        };

        write_pixels(&rgba, format, buffer.pixels_mut());
        Ok(buffer)
    }

    fn decode_rgba(
        &self,
        source: &[u8],
        config: &BufferConfiguration,
    ) -> Result<RgbaImage, DecodeError> {
        if source.is_empty() {
            return Err(DecodeError::Empty);
        }

        let img = ImageReader::new(Cursor::new(source))
            .with_guessed_format()
            .map_err(|e| DecodeError::Io(e.to_string()))?
            .decode()
            .map_err(|e| DecodeError::InvalidImage {
                message: e.to_string(),
            })?;

        let (width, height) = config.target_dimensions(img.width(), img.height());
        let img = if (width, height) != (img.width(), img.height()) {
            img.resize_exact(width, height, FilterType::Triangle)
        } else {
            img
        };

        Ok(img.to_rgba8())
    }
}

/// Encode RGBA pixels into `dst` using `format`.
fn write_pixels(rgba: &RgbaImage, format: PixelFormat, dst: &mut [u8]) {
    if format == PixelFormat::Rgba8888 {
        dst.copy_from_slice(rgba.as_raw());
        return;
    }

    let bpp = format.bytes_per_pixel();
    for (out, px) in dst.chunks_exact_mut(bpp).zip(rgba.as_raw().chunks_exact(4)) {
        format.write(out, [px[0], px[1], px[2], px[3]]);
    }
}

#[async_trait]
impl TileDecoder for ImageDecoder {
    async fn decode(
        &self,
        mut stream: TileStream,
        config: &BufferConfiguration,
        reuse: Option<PixelBuffer>,
    ) -> Result<PixelBuffer, DecodeFailure> {
        let mut source = Vec::new();
        if let Err(e) = stream.read_to_end(&mut source).await {
            return Err(DecodeFailure::new(DecodeError::Io(e.to_string()), reuse));
        }
        if source.is_empty() {
            return Err(DecodeFailure::new(DecodeError::Empty, reuse));
        }

        let decoder = *self;
        let config = *config;
        tokio::task::spawn_blocking(move || decoder.decode_bytes(&source, &config, reuse))
            .await
            .unwrap_or_else(|e| {
                Err(DecodeFailure::new(
                    DecodeError::Cancelled(e.to_string()),
                    None,
                ))
            })
    }
}

// =============================================================================
// Tests
// =============================================================================
