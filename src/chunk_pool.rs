// SPDX-License-Identifier: MIT
//
// Fixed-capacity chunk pool: one contiguous byte buffer carved into
// `chunk_count` chunks of `chunk_size` bytes, lent and reclaimed through an
// intrusive free list threaded through the first 4 bytes of each free
// chunk. The free list itself is guarded by a short-held spin lock; LIFO
// ordering falls out naturally from pushing returned chunks onto the head.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::chunk::{Chunk, SENTINEL};
use crate::error::{Error, Result};
use crate::spin_lock::SpinLock;

/// Largest buffer this pool will allocate: matches the .NET-derived bound of
/// `int.MaxValue - 0x38` used to leave room for array/object headers.
pub const MAX_BUFFER_SIZE: usize = 0x7FFF_FFC7;

/// Bytes currently lent from any [`ChunkPool`]'s shared buffer, across the
/// whole process.
static TOTAL_POOL_ALLOCATED: AtomicU64 = AtomicU64::new(0);

/// Bytes currently outstanding in heap-fallback chunks, across the whole
/// process.
static TOTAL_MEMORY_ALLOCATED: AtomicU64 = AtomicU64::new(0);

/// A point-in-time snapshot of the two process-wide allocation counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Bytes currently lent from pool buffers.
    pub total_pool_allocated: u64,
    /// Bytes currently outstanding as heap-fallback chunks.
    pub total_memory_allocated: u64,
}

/// Read both process-wide counters with a single atomic load each.
pub fn pool_stats() -> PoolStats {
    PoolStats {
        total_pool_allocated: TOTAL_POOL_ALLOCATED.load(Ordering::Relaxed),
        total_memory_allocated: TOTAL_MEMORY_ALLOCATED.load(Ordering::Relaxed),
    }
}

/// Serializes tests across this crate that assert on an exact `pool_stats()`
/// delta, since the counters it reads are process-global and `cargo test`
/// runs unit tests in parallel by default.
#[cfg(test)]
pub(crate) static STATS_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Read a little-endian i32 out of `buf` at `offset`.
#[inline]
fn read_link(buf: &[u8], offset: usize) -> i32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[offset..offset + 4]);
    i32::from_le_bytes(b)
}

/// Write a little-endian i32 into `buf` at `offset`.
#[inline]
fn write_link(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// A fixed-capacity pool of `chunk_size`-byte chunks carved out of one
/// contiguous buffer.
///
/// Designed for concurrent, multi-threaded rent/return; a chunked stream
/// built on top of one is itself single-threaded (see the crate's
/// concurrency notes), but the pool may be shared across many streams
/// across many threads.
pub struct ChunkPool {
    buffer: UnsafeCell<Box<[u8]>>,
    chunk_size: usize,
    chunk_count: usize,
    lock: SpinLock,
    next: UnsafeCell<i32>,
}

// `buffer` and `next` are only ever touched while `lock` is held (for the
// free-list bookkeeping) or through a chunk's exclusive ownership (for chunk
// payload bytes, which the pool itself never reads/writes once lent).
unsafe impl Send for ChunkPool {}
unsafe impl Sync for ChunkPool {}

impl std::fmt::Debug for ChunkPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkPool")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_count", &self.chunk_count)
            .finish()
    }
}

impl ChunkPool {
    /// Construct a pool of `chunk_count` chunks of `chunk_size` bytes each,
    /// wrapped in an `Arc` since rented [`Chunk`] values keep the pool alive
    /// for as long as they reference its buffer.
    ///
    /// Fails with [`Error::InvalidArgument`] when `chunk_size < 4`,
    /// `chunk_count < 1`, or `chunk_size * chunk_count` exceeds
    /// [`MAX_BUFFER_SIZE`].
    pub fn new(chunk_size: usize, chunk_count: usize) -> Result<Arc<Self>> {
        if chunk_size < 4 {
            return Err(Error::InvalidArgument(format!(
                "chunk_size must be >= 4, got {chunk_size}"
            )));
        }
        if chunk_count < 1 {
            return Err(Error::InvalidArgument(format!(
                "chunk_count must be >= 1, got {chunk_count}"
            )));
        }
        let total = chunk_size
            .checked_mul(chunk_count)
            .filter(|&t| t <= MAX_BUFFER_SIZE)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "chunk_size * chunk_count ({chunk_size} * {chunk_count}) exceeds {MAX_BUFFER_SIZE}"
                ))
            })?;

        let mut buffer = vec![0u8; total].into_boxed_slice();
        for i in 0..chunk_count {
            let offset = i * chunk_size;
            let next = if i + 1 < chunk_count {
                ((i + 1) * chunk_size) as i32
            } else {
                SENTINEL
            };
            write_link(&mut buffer, offset, next);
        }

        tracing::debug!(chunk_size, chunk_count, total, "chunk pool constructed");

        Ok(Arc::new(ChunkPool {
            buffer: UnsafeCell::new(buffer),
            chunk_size,
            chunk_count,
            lock: SpinLock::new(),
            next: UnsafeCell::new(0),
        }))
    }

    /// Configured chunk size in bytes.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Configured chunk count.
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Pointer to the first byte of the chunk at `handle` (a byte offset
    /// into this pool's buffer). Callers must only pass handles obtained
    /// from this pool.
    pub(crate) fn chunk_ptr(&self, handle: i32) -> *mut u8 {
        unsafe { (*self.buffer.get()).as_mut_ptr().add(handle as usize) }
    }

    /// Pop the head of the free list, or `None` if the pool is exhausted.
    /// Never blocks longer than the short-held free-list lock.
    pub fn try_rent(self: &Arc<Self>, clear: bool) -> Option<Chunk> {
        self.lock.lock();
        let head = unsafe { *self.next.get() };
        if head == SENTINEL {
            self.lock.unlock();
            return None;
        }
        let next = {
            let buf = unsafe { &*self.buffer.get() };
            read_link(buf, head as usize)
        };
        unsafe {
            *self.next.get() = next;
        }
        self.lock.unlock();

        if clear {
            let buf = unsafe { &mut *self.buffer.get() };
            buf[head as usize..head as usize + self.chunk_size].fill(0);
        }

        TOTAL_POOL_ALLOCATED.fetch_add(self.chunk_size as u64, Ordering::Relaxed);
        tracing::trace!(handle = head, clear, "chunk rented from pool");
        Some(Chunk::from_pool(Arc::clone(self), head, self.chunk_size))
    }

    /// Like [`ChunkPool::try_rent`], but falls back to a heap allocation
    /// (handle = -1) when the pool is exhausted.
    pub fn rent(self: &Arc<Self>, clear: bool) -> Chunk {
        if let Some(c) = self.try_rent(clear) {
            return c;
        }
        // Heap fallback chunks are always zero-filled: a fresh `Vec<u8>`
        // allocation is zeroed regardless of `clear`, so there's no
        // uninitialized-memory path to special-case here.
        let data = vec![0u8; self.chunk_size].into_boxed_slice();
        TOTAL_MEMORY_ALLOCATED.fetch_add(self.chunk_size as u64, Ordering::Relaxed);
        tracing::debug!(chunk_size = self.chunk_size, "pool exhausted, falling back to heap chunk");
        Chunk::from_heap(data)
    }

    /// True iff `chunk` is non-null, pool-provenance, and was rented from
    /// this pool specifically.
    pub fn is_from_pool(&self, chunk: &Chunk) -> bool {
        chunk.is_from_pool() && chunk.belongs_to(self)
    }

    /// Return `chunk` to this pool (or release it, if heap-provenance).
    /// On success, `*chunk` becomes the null chunk.
    ///
    /// Fails with [`Error::InvalidArgument`] for the null chunk, and with
    /// [`Error::ForeignChunk`] for a pool-provenance chunk that was rented
    /// from a different pool.
    pub fn return_chunk(&self, chunk: &mut Chunk) -> Result<()> {
        if chunk.is_null() {
            return Err(Error::InvalidArgument("cannot return the null chunk".into()));
        }

        if chunk.is_from_pool() {
            if !chunk.belongs_to(self) {
                return Err(Error::ForeignChunk { handle: chunk.handle() });
            }
            let handle = chunk.handle();

            self.lock.lock();
            let head = unsafe { *self.next.get() };
            {
                let buf = unsafe { &mut *self.buffer.get() };
                write_link(buf, handle as usize, head);
            }
            unsafe {
                *self.next.get() = handle;
            }
            self.lock.unlock();

            TOTAL_POOL_ALLOCATED.fetch_sub(self.chunk_size as u64, Ordering::Relaxed);
            tracing::trace!(handle, "chunk returned to pool");
        } else {
            TOTAL_MEMORY_ALLOCATED.fetch_sub(self.chunk_size as u64, Ordering::Relaxed);
            tracing::trace!("heap-fallback chunk released");
        }

        *chunk = Chunk::null();
        Ok(())
    }
}
