// SPDX-License-Identifier: MIT
//
// Strategy for renting/returning a chunked stream's sparse chunk-index
// array. The default strategy is a trivial heap allocator with
// power-of-two rounding; a caller may inject a more sophisticated
// (e.g. bucketed) implementation behind the same trait.

use crate::chunk::Chunk;

/// Largest request size for which [`ChunkArrayPool::rent`] rounds up to the
/// next power of two. Past this, arrays are sized exactly to the request.
pub const MAX_ROUNDED_LEN: usize = 1 << 30;

/// A strategy for renting and returning a stream's sparse array of
/// [`Chunk`] slots.
///
/// Negative lengths don't need guarding against here the way the source
/// specification does: `usize` makes that precondition vacuous.
pub trait ChunkArrayPool: std::fmt::Debug + Send + Sync {
    /// Rent an array of at least `min_len` null [`Chunk`] slots.
    fn rent(&self, min_len: usize) -> Vec<Chunk>;

    /// Return a previously rented array. If `clear` is true and the
    /// strategy reuses storage, every slot must read back as null on the
    /// next `rent`.
    fn return_array(&self, array: Vec<Chunk>, clear: bool);
}

/// The default strategy: a fresh heap allocation on every `rent`, sized to
/// the next power of two (or exactly, above [`MAX_ROUNDED_LEN`]). `return_array`
/// is a no-op — reclamation is left to the allocator.
#[derive(Debug, Default)]
pub struct HeapChunkArrayPool;

impl ChunkArrayPool for HeapChunkArrayPool {
    fn rent(&self, min_len: usize) -> Vec<Chunk> {
        if min_len == 0 {
            return Vec::new();
        }
        let len = if min_len > MAX_ROUNDED_LEN {
            min_len
        } else {
            min_len.next_power_of_two()
        };
        let mut v = Vec::with_capacity(len);
        v.resize_with(len, Chunk::null);
        v
    }

    fn return_array(&self, array: Vec<Chunk>, _clear: bool) {
        drop(array);
    }
}
