// SPDX-License-Identifier: MIT
//
// A seekable, growable byte stream backed by a fixed-capacity, intrusive
// free-list chunk pool. The pool hands out fixed-size chunks under a
// short-held lock and falls back to heap allocation when exhausted; the
// stream arranges chunks into a sparse, growable array and implements
// position/length semantics (including zero-filled holes and
// mutation-safe iteration) on top.

mod cancellation;
mod chunk;
mod chunk_array_pool;
mod chunk_pool;
mod sink;
mod spin_lock;
mod stream;

pub mod buffer_writer;
pub mod error;

pub use cancellation::CancellationToken;
pub use chunk::{Chunk, SENTINEL};
pub use chunk_array_pool::{ChunkArrayPool, HeapChunkArrayPool, MAX_ROUNDED_LEN};
pub use chunk_pool::{pool_stats, ChunkPool, PoolStats, MAX_BUFFER_SIZE};
pub use error::{Error, Result};
pub use sink::{AsyncByteSink, ByteSink};
pub use stream::{ChunkedStream, ChunkedStreamBuilder, SeekOrigin};

pub use buffer_writer::BufferWriter;
