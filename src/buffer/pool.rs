//! Pool of reusable pixel buffers.
//!
//! Decoding a tile needs a buffer of a predictable size (it depends only on
//! the tile size and the [`BufferConfiguration`](super::BufferConfiguration)),
//! so buffers released by the renderer can be handed straight to the next
//! decode instead of being reallocated.
//!
//! # Buckets
//!
//! Idle buffers are filed under their bucket (byte size class). A request
//! for bucket `n` is served from bucket `n` when possible, otherwise from the
//! smallest larger bucket. A buffer smaller than requested is never handed out.
//!
//! # Serialization
//!
//! All bookkeeping lives behind a single lock. `get` removes the buffer from
//! the pool while holding it, so a buffer can never be issued twice.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::warn;

use super::pixel::PixelBuffer;

/// Snapshot of pool usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Buffers currently idle in the pool
    pub idle_buffers: usize,

    /// Total capacity of idle buffers in bytes
    pub idle_bytes: usize,

    /// `get` calls served from the pool
    pub hits: u64,

    /// `get` calls that found nothing suitable
    pub misses: u64,

    /// `put` calls that were refused
    pub rejected: u64,
}

/// Thread-safe store of idle [`PixelBuffer`]s keyed by bucket.
///
/// The pool is unbounded; memory is bounded by how many tiles are in flight
/// and by what the caller decides to return. It is meant to be shared through
/// an `Arc` and may outlive any number of collection runs.
///
/// # Example
///
/// ```
/// use tile_collector::buffer::{PixelBuffer, PixelBufferPool, PixelFormat};
///
/// #[tokio::main]
/// async fn main() {
///     let pool = PixelBufferPool::new();
///     let buffer = PixelBuffer::allocate(256, 256, PixelFormat::Rgb565);
///     let bucket = buffer.bucket();
///
///     assert!(pool.put(buffer).await);
///     let reused = pool.get(bucket).await;
///     assert!(reused.is_some());
///     assert!(pool.get(bucket).await.is_none());
/// }
/// ```
pub struct PixelBufferPool {
    free: Mutex<BTreeMap<usize, Vec<PixelBuffer>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    rejected: AtomicU64,
}

impl PixelBufferPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self {
            free: Mutex::new(BTreeMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Take an idle buffer whose capacity is at least `bucket` bytes.
    ///
    /// Returns `None` immediately when nothing suitable is idle; this never
    /// waits for another holder to return a buffer.
    pub async fn get(&self, bucket: usize) -> Option<PixelBuffer> {
        let mut free = self.free.lock().await;

        let key = free
            .range(bucket..)
            .find(|(_, list)| !list.is_empty())
            .map(|(key, _)| *key);

        let buffer = match key {
            Some(key) => {
                let list = free.get_mut(&key)?;
                let buffer = list.pop();
                let drained = list.is_empty();
                if drained {
                    free.remove(&key);
                }
                buffer
            }
            None => None,
        };

        match buffer {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };

        buffer
    }

    /// Return a buffer to its bucket's free list.
    ///
    /// Buffers that cannot be safely reused (empty, or with storage smaller
    /// than their bucket) are dropped instead and `false` is returned.
    pub async fn put(&self, buffer: PixelBuffer) -> bool {
        if !buffer.is_consistent() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(
                bucket = buffer.bucket(),
                capacity = buffer.capacity(),
                "Rejected inconsistent buffer returned to pool"
            );
            return false;
        }

        let mut free = self.free.lock().await;
        free.entry(buffer.bucket()).or_default().push(buffer);
        true
    }

    /// Number of idle buffers.
    pub async fn len(&self) -> usize {
        let free = self.free.lock().await;
        free.values().map(Vec::len).sum()
    }

    /// Check if the pool holds no idle buffers.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every idle buffer.
    pub async fn clear(&self) {
        let mut free = self.free.lock().await;
        free.clear();
    }

    /// Current counters and idle totals.
    pub async fn stats(&self) -> PoolStats {
        let free = self.free.lock().await;
        let (idle_buffers, idle_bytes) = free
            .values()
            .flatten()
            .fold((0, 0), |(count, bytes), buffer| {
                (count + 1, bytes + buffer.capacity())
            });

        PoolStats {
            idle_buffers,
            idle_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

impl Default for PixelBufferPool {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
