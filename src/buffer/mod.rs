//! Pixel buffers and the buffer reuse pool.
//!
//! - [`PixelFormat`]: in-memory pixel layout of decoded tiles
//! - [`BufferConfiguration`]: pixel format plus downsample factor for one collector
//! - [`PixelBuffer`]: exclusively owned decoded image data
//! - [`PixelBufferPool`]: shared, lock-serialized store of idle buffers

mod pixel;
mod pool;

pub use pixel::{BufferConfiguration, PixelBuffer, PixelFormat};
pub use pool::{PixelBufferPool, PoolStats};
