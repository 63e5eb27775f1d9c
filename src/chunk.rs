// SPDX-License-Identifier: MIT
//
// The chunk value type: an immutable descriptor of a fixed-size byte region
// plus provenance (which pool lent it, or "heap fallback"). Chunks never
// grow or shrink after creation; only the bytes they point at are mutable.

use std::fmt;
use std::sync::Arc;

use crate::chunk_pool::ChunkPool;

/// Sentinel handle meaning "no successor" (free-list tail) or "not from a pool".
pub const SENTINEL: i32 = -1;

enum Origin {
    Null,
    Pool {
        pool: Arc<ChunkPool>,
        handle: i32,
        len: usize,
    },
    Heap {
        data: Box<[u8]>,
    },
}

/// A fixed-size byte region plus a handle identifying its origin.
///
/// The null chunk (`Chunk::null()`) represents a hole: a logical region of
/// zero bytes that has never been materialized into real storage. A
/// non-null chunk is either pool-provenance (rented from a [`ChunkPool`],
/// identified by the byte offset of its first byte within the pool's
/// shared buffer) or heap-provenance (a plain heap allocation used when the
/// pool was exhausted at rent time).
pub struct Chunk {
    origin: Origin,
}

// The region behind a pool-provenance chunk is exclusively owned by whoever
// holds the `Chunk` value (the pool never touches a lent chunk's bytes), so
// transferring a `Chunk` across threads is sound even though it is built on
// a shared buffer and a raw offset.
unsafe impl Send for Chunk {}

impl Chunk {
    /// The null chunk: no region, no handle.
    pub const fn null() -> Self {
        Chunk { origin: Origin::Null }
    }

    pub(crate) fn from_pool(pool: Arc<ChunkPool>, handle: i32, len: usize) -> Self {
        Chunk {
            origin: Origin::Pool { pool, handle, len },
        }
    }

    pub(crate) fn from_heap(data: Box<[u8]>) -> Self {
        Chunk {
            origin: Origin::Heap { data },
        }
    }

    /// True iff this is the null (hole) chunk.
    pub fn is_null(&self) -> bool {
        matches!(self.origin, Origin::Null)
    }

    /// True iff this chunk is non-null and was rented from a pool.
    pub fn is_from_pool(&self) -> bool {
        matches!(self.origin, Origin::Pool { .. })
    }

    /// True iff this chunk is non-null and is a heap-allocated fallback.
    pub fn is_from_heap(&self) -> bool {
        matches!(self.origin, Origin::Heap { .. })
    }

    /// The chunk's handle: its pool offset, or [`SENTINEL`] for heap
    /// provenance or the null chunk.
    pub fn handle(&self) -> i32 {
        match &self.origin {
            Origin::Pool { handle, .. } => *handle,
            _ => SENTINEL,
        }
    }

    /// Whether `pool` is the pool this chunk was rented from.
    pub(crate) fn belongs_to(&self, pool: &ChunkPool) -> bool {
        match &self.origin {
            Origin::Pool { pool: p, .. } => std::ptr::eq(p.as_ref(), pool),
            _ => false,
        }
    }

    /// Length of the chunk's region (0 for the null chunk).
    pub fn len(&self) -> usize {
        match &self.origin {
            Origin::Null => 0,
            Origin::Pool { len, .. } => *len,
            Origin::Heap { data } => data.len(),
        }
    }

    /// True iff `len() == 0` (only the null chunk qualifies).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn as_slice(&self) -> &[u8] {
        match &self.origin {
            Origin::Null => &[],
            Origin::Pool { pool, handle, len } => unsafe {
                std::slice::from_raw_parts(pool.chunk_ptr(*handle), *len)
            },
            Origin::Heap { data } => data,
        }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.origin {
            Origin::Null => &mut [],
            Origin::Pool { pool, handle, len } => unsafe {
                std::slice::from_raw_parts_mut(pool.chunk_ptr(*handle), *len)
            },
            Origin::Heap { data } => data,
        }
    }

    /// Borrow `len` bytes starting at `offset` within this chunk's region.
    ///
    /// # Panics
    /// Panics if `offset + len` exceeds the chunk's length, mirroring slice
    /// indexing panics elsewhere in the crate.
    pub fn view(&self, offset: usize, len: usize) -> &[u8] {
        &self.as_slice()[offset..offset + len]
    }

    /// Mutably borrow `len` bytes starting at `offset` within this chunk's
    /// region. See [`Chunk::view`] for panic behavior.
    pub fn view_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut self.as_mut_slice()[offset..offset + len]
    }

    /// Zero the sub-range `[offset, offset + len)` of this chunk's region.
    pub fn zero(&mut self, offset: usize, len: usize) {
        self.view_mut(offset, len).fill(0);
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Origin::Null => f.write_str("Chunk::Null"),
            Origin::Pool { handle, len, .. } => f
                .debug_struct("Chunk::Pool")
                .field("handle", handle)
                .field("len", len)
                .finish(),
            Origin::Heap { data } => f.debug_struct("Chunk::Heap").field("len", &data.len()).finish(),
        }
    }
}
