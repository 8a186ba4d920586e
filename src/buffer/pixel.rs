//! Pixel formats, decode configuration and the pixel buffer itself.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// =============================================================================
// Pixel Format
// =============================================================================

/// In-memory layout of decoded pixels.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 8 bits per channel, red/green/blue/alpha
    #[default]
    Rgba8888,

    /// 16-bit little-endian 5/6/5 packed RGB, always opaque
    Rgb565,

    /// 8-bit luminance, always opaque
    Luma8,
}

impl PixelFormat {
    /// Number of bytes one pixel occupies.
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8888 => 4,
            PixelFormat::Rgb565 => 2,
            PixelFormat::Luma8 => 1,
        }
    }

    /// Whether the format stores an alpha channel.
    #[inline]
    pub fn has_alpha(self) -> bool {
        matches!(self, PixelFormat::Rgba8888)
    }

    /// Expand one encoded pixel to RGBA.
    ///
    /// # Panics
    /// Panics if `bytes` is shorter than [`bytes_per_pixel`](Self::bytes_per_pixel).
    #[inline]
    pub fn read(self, bytes: &[u8]) -> [u8; 4] {
        match self {
            PixelFormat::Rgba8888 => [bytes[0], bytes[1], bytes[2], bytes[3]],
            PixelFormat::Rgb565 => {
                let v = u16::from_le_bytes([bytes[0], bytes[1]]);
                let r = ((v >> 11) & 0x1F) as u8;
                let g = ((v >> 5) & 0x3F) as u8;
                let b = (v & 0x1F) as u8;
                [r << 3 | r >> 2, g << 2 | g >> 4, b << 3 | b >> 2, 0xFF]
            }
            PixelFormat::Luma8 => [bytes[0], bytes[0], bytes[0], 0xFF],
        }
    }

    /// Encode an RGBA pixel into `bytes`.
    ///
    /// Formats without alpha drop the alpha channel.
    ///
    /// # Panics
    /// Panics if `bytes` is shorter than [`bytes_per_pixel`](Self::bytes_per_pixel).
    #[inline]
    pub fn write(self, bytes: &mut [u8], rgba: [u8; 4]) {
        match self {
            PixelFormat::Rgba8888 => bytes[..4].copy_from_slice(&rgba),
            PixelFormat::Rgb565 => {
                let [r, g, b, _] = rgba;
                let v = ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3);
                bytes[..2].copy_from_slice(&v.to_le_bytes());
            }
            PixelFormat::Luma8 => {
                let [r, g, b, _] = rgba;
                // Rec. 709 luma weights
                let luma = (r as u32 * 2126 + g as u32 * 7152 + b as u32 * 722 + 5000) / 10_000;
                bytes[0] = luma.min(255) as u8;
            }
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgba8888 => "rgba8888",
            PixelFormat::Rgb565 => "rgb565",
            PixelFormat::Luma8 => "luma8",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Buffer Configuration
// =============================================================================

/// Decode target shared by every decode of one collector.
///
/// Determines the pixel format and how much a source image is shrunk, and
/// therefore which pool bucket a decode draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferConfiguration {
    pixel_format: PixelFormat,
    downsample: u32,
}

impl BufferConfiguration {
    /// Create a configuration, rejecting a zero downsample factor.
    pub fn new(pixel_format: PixelFormat, downsample: u32) -> Result<Self, ConfigError> {
        if downsample == 0 {
            return Err(ConfigError::InvalidDownsample(downsample));
        }
        Ok(Self {
            pixel_format,
            downsample,
        })
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn downsample(&self) -> u32 {
        self.downsample
    }

    /// Dimensions of a `width` x `height` source image after downsampling.
    ///
    /// Never returns a zero dimension.
    #[inline]
    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        (
            (width / self.downsample).max(1),
            (height / self.downsample).max(1),
        )
    }

    /// Byte size of a decoded square tile of `tile_size` source pixels.
    pub fn bucket_for(&self, tile_size: u32) -> usize {
        let (w, h) = self.target_dimensions(tile_size, tile_size);
        w as usize * h as usize * self.pixel_format.bytes_per_pixel()
    }
}

impl Default for BufferConfiguration {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::default(),
            downsample: 1,
        }
    }
}

// =============================================================================
// Pixel Buffer
// =============================================================================

/// Decoded image data.
///
/// A buffer has exactly one owner at a time: the worker decoding into it, the
/// [`FinishedTile`](crate::tile::FinishedTile) carrying it, or the pool holding
/// it idle. It is deliberately not `Clone`.
///
/// The bucket is the byte size class the buffer was allocated for; the backing
/// storage always has at least that much capacity.
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    bucket: usize,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Allocate a zeroed buffer.
    pub fn allocate(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = Self::byte_len_for(width, height, format);
        Self {
            width,
            height,
            format,
            bucket: len,
            data: vec![0u8; len],
        }
    }

    /// Wrap existing pixel data.
    ///
    /// Fails if `data` does not hold exactly `width * height` pixels of `format`.
    pub fn from_raw(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, ConfigError> {
        let expected = Self::byte_len_for(width, height, format);
        if data.len() != expected {
            return Err(ConfigError::InvalidBuffer {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            bucket: expected,
            data,
        })
    }

    #[inline]
    fn byte_len_for(width: u32, height: u32, format: PixelFormat) -> usize {
        width as usize * height as usize * format.bytes_per_pixel()
    }

    /// Resize the buffer for a new image, keeping its allocation when it is
    /// large enough.
    ///
    /// Pixel contents are reset to zero.
    pub fn reshape(&mut self, width: u32, height: u32, format: PixelFormat) {
        let len = Self::byte_len_for(width, height, format);
        self.data.clear();
        self.data.resize(len, 0);
        self.width = width;
        self.height = height;
        self.format = format;
        self.bucket = self.bucket.max(len);
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Byte size class used to file this buffer in the pool.
    pub fn bucket(&self) -> usize {
        self.bucket
    }

    /// Bytes the backing storage can hold without reallocating.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Bytes currently used by pixel data.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Raw encoded pixel data, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw pixel data, row-major.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consume the buffer and return its storage.
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Whether the buffer can be safely reused by the pool.
    pub fn is_consistent(&self) -> bool {
        self.bucket > 0
            && self.data.len() == Self::byte_len_for(self.width, self.height, self.format)
            && self.data.capacity() >= self.bucket
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.format.bytes_per_pixel()
    }

    /// Read the pixel at `(x, y)` as RGBA.
    ///
    /// # Panics
    /// Panics if the coordinate is outside the buffer.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        let offset = self.offset(x, y);
        self.format.read(&self.data[offset..])
    }

    /// Write an RGBA pixel at `(x, y)`.
    ///
    /// # Panics
    /// Panics if the coordinate is outside the buffer.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        let offset = self.offset(x, y);
        self.format.write(&mut self.data[offset..], rgba);
    }

    /// Paint every pixel with one colour.
    pub fn fill(&mut self, rgba: [u8; 4]) {
        let bpp = self.format.bytes_per_pixel();
        let format = self.format;
        for chunk in self.data.chunks_exact_mut(bpp) {
            format.write(chunk, rgba);
        }
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bucket", &self.bucket)
            .field("capacity", &self.data.capacity())
            .finish()
    }
}

/// Buffers are equal when they hold the same image; the bucket and spare
/// capacity are ignored.
impl PartialEq for PixelBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.format == other.format
            && self.data == other.data
    }
}

impl Eq for PixelBuffer {}
