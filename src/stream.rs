// SPDX-License-Identifier: MIT
//
// A seekable, growable byte stream whose backing storage is a sparse
// sequence of chunks drawn from a `ChunkPool`. Reads treat an unset (null)
// slot as a run of zero bytes — a "hole" — rather than materializing
// storage for it; writes rent chunks on demand and zero-fill any gap
// between the old length and a write that starts past it.

use std::io;
use std::sync::Arc;

use crate::chunk::Chunk;
use crate::chunk_array_pool::{ChunkArrayPool, HeapChunkArrayPool};
use crate::chunk_pool::ChunkPool;
use crate::error::{Error, Result};
use crate::sink::{AsyncByteSink, ByteSink};
use crate::CancellationToken;

/// `chunk_index(p)`: which chunk slot covers byte position `p`.
#[inline]
fn chunk_index(chunk_size: usize, p: u64) -> usize {
    (p / chunk_size as u64) as usize
}

/// `chunk_offset(p)`: the in-chunk byte offset of position `p`.
#[inline]
fn chunk_offset(chunk_size: usize, p: u64) -> usize {
    (p % chunk_size as u64) as usize
}

/// The "upper-bound" chunk position used for range ends: a position landing
/// exactly on a chunk boundary is reported as `(prev_index, chunk_size)` so
/// `[from, to)` iteration can treat every range end uniformly as "closes
/// out the preceding chunk".
#[inline]
fn upper_bound(chunk_size: usize, p: u64) -> (usize, usize) {
    if p > 0 && chunk_offset(chunk_size, p) == 0 {
        (chunk_index(chunk_size, p) - 1, chunk_size)
    } else {
        (chunk_index(chunk_size, p), chunk_offset(chunk_size, p))
    }
}

/// `seek`'s origin, mirroring `std::io::SeekFrom` but kept crate-local so
/// the typed API doesn't require pulling in `std::io` at every call site.
#[derive(Debug, Clone, Copy)]
pub enum SeekOrigin {
    /// Relative to byte 0.
    Begin(u64),
    /// Relative to the current position.
    Current(i64),
    /// Relative to the current length.
    End(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    ReadWrite,
    /// Entered via `as_output_stream`: monotonic reads only, each chunk
    /// released to the pool as soon as it's fully consumed.
    ReadForward,
    Disposed,
}

/// A seekable, growable in-memory byte stream backed by a sparse sequence
/// of pool-rented chunks.
///
/// Not thread-safe: a `ChunkedStream` is meant to be owned and driven by a
/// single thread, even though the [`ChunkPool`] it draws from may be shared
/// across many threads and streams.
pub struct ChunkedStream {
    pool: Arc<ChunkPool>,
    array_pool: Arc<dyn ChunkArrayPool>,
    chunks: Vec<Chunk>,
    length: u64,
    position: u64,
    state: StreamState,
    /// In `ReadForward`, the first chunk index not yet released.
    forward_released_up_to: usize,
}

/// Builder for [`ChunkedStream`], letting callers inject a custom
/// [`ChunkArrayPool`] strategy or pre-size the sparse chunk array.
pub struct ChunkedStreamBuilder {
    pool: Arc<ChunkPool>,
    array_pool: Arc<dyn ChunkArrayPool>,
    capacity_hint: usize,
}

impl ChunkedStreamBuilder {
    /// Use a custom chunk-array-pool strategy instead of the default
    /// heap-allocating one.
    pub fn array_pool(mut self, array_pool: Arc<dyn ChunkArrayPool>) -> Self {
        self.array_pool = array_pool;
        self
    }

    /// Pre-size the sparse chunk array to hold at least this many chunk
    /// slots, avoiding an early doubling-growth step.
    pub fn capacity_hint(mut self, chunks: usize) -> Self {
        self.capacity_hint = chunks;
        self
    }

    /// Build the stream.
    pub fn build(self) -> ChunkedStream {
        let chunks = if self.capacity_hint == 0 {
            Vec::new()
        } else {
            self.array_pool.rent(self.capacity_hint)
        };
        ChunkedStream {
            pool: self.pool,
            array_pool: self.array_pool,
            chunks,
            length: 0,
            position: 0,
            state: StreamState::ReadWrite,
            forward_released_up_to: 0,
        }
    }
}

impl ChunkedStream {
    /// Start building a stream over `pool`.
    pub fn builder(pool: Arc<ChunkPool>) -> ChunkedStreamBuilder {
        ChunkedStreamBuilder {
            pool,
            array_pool: Arc::new(HeapChunkArrayPool),
            capacity_hint: 0,
        }
    }

    /// A stream over `pool` with default settings (heap chunk-array
    /// strategy, no pre-sizing).
    pub fn new(pool: Arc<ChunkPool>) -> Self {
        Self::builder(pool).build()
    }

    /// Logical length in bytes.
    pub fn len(&self) -> u64 {
        self.length
    }

    /// True iff the stream has zero logical length.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Current cursor position.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn chunk_size(&self) -> usize {
        self.pool.chunk_size()
    }

    fn ensure_not_disposed(&self) -> Result<()> {
        if self.state == StreamState::Disposed {
            return Err(Error::Disposed);
        }
        Ok(())
    }

    fn ensure_read_write(&self) -> Result<()> {
        self.ensure_not_disposed()?;
        if self.state == StreamState::ReadForward {
            return Err(Error::InvalidOperation(
                "write/truncate/backward-seek is not permitted in the forward-only read state".into(),
            ));
        }
        Ok(())
    }

    fn check_size_bound(&self, position: u64) -> Result<()> {
        let idx = position / self.chunk_size() as u64;
        if idx > i32::MAX as u64 {
            return Err(Error::StreamTooLarge);
        }
        Ok(())
    }

    /// Grow the sparse chunk array (via the chunk-array pool, which rounds
    /// up to the next power of two) so that index `min_len - 1` is valid.
    fn ensure_capacity(&mut self, min_len: usize) {
        if self.chunks.len() >= min_len {
            return;
        }
        let mut new_chunks = self.array_pool.rent(min_len);
        for (i, slot) in self.chunks.iter_mut().enumerate() {
            new_chunks[i] = std::mem::replace(slot, Chunk::null());
        }
        let old_len = self.chunks.len();
        let old = std::mem::replace(&mut self.chunks, new_chunks);
        tracing::trace!(old_len, new_len = self.chunks.len(), "chunk array grown");
        self.array_pool.return_array(old, false);
    }

    /// Zero-fill the gap introduced by growing `length` to `new_length`,
    /// without touching any chunk beyond the old length's boundary chunk.
    /// Shared by `write` (growing past end-of-stream) and `set_length`.
    fn zero_fill_grow(&mut self, new_length: u64) {
        let chunk_size = self.chunk_size();
        let (i_new, o_new) = upper_bound(chunk_size, new_length);
        let (i_old, o_old) = upper_bound(chunk_size, self.length);

        if i_new == i_old {
            if o_new > o_old {
                if let Some(c) = self.chunks.get_mut(i_old) {
                    if !c.is_null() {
                        c.zero(o_old, o_new - o_old);
                    }
                }
            }
        } else if let Some(c) = self.chunks.get_mut(i_old) {
            if !c.is_null() && o_old < chunk_size {
                c.zero(o_old, chunk_size - o_old);
            }
        }
    }

    /// Read up to `dst.len()` bytes, stopping at end-of-stream. Holes read
    /// back as zero. Returns the number of bytes read (0 at EOF).
    pub fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
        self.ensure_not_disposed()?;
        let chunk_size = self.chunk_size();
        let avail = self.length.saturating_sub(self.position);
        let want = (dst.len() as u64).min(avail) as usize;

        let mut done = 0usize;
        let mut pos = self.position;
        while done < want {
            let idx = chunk_index(chunk_size, pos);
            let off = chunk_offset(chunk_size, pos);
            let take = (chunk_size - off).min(want - done);
            match self.chunks.get(idx) {
                Some(c) if !c.is_null() => dst[done..done + take].copy_from_slice(c.view(off, take)),
                _ => dst[done..done + take].fill(0),
            }
            done += take;
            pos += take as u64;
        }
        self.position = pos;

        if self.state == StreamState::ReadForward {
            self.release_forward_consumed();
        }
        Ok(done)
    }

    /// Read a single byte, returning -1 at end-of-stream.
    pub fn read_byte(&mut self) -> Result<i32> {
        let mut buf = [0u8; 1];
        let n = self.read(&mut buf)?;
        if n == 0 {
            Ok(-1)
        } else {
            Ok(buf[0] as i32)
        }
    }

    /// Release any chunk slots fully behind the current position back to
    /// the pool. Only valid to call in the `ReadForward` state.
    fn release_forward_consumed(&mut self) {
        let chunk_size = self.chunk_size();
        let fully_consumed_up_to = chunk_index(chunk_size, self.position);
        while self.forward_released_up_to < fully_consumed_up_to
            && self.forward_released_up_to < self.chunks.len()
        {
            let idx = self.forward_released_up_to;
            if !self.chunks[idx].is_null() {
                // Best-effort: a foreign chunk here would indicate a bug
                // elsewhere in this stream's bookkeeping, not a user error.
                let _ = self.pool.return_chunk(&mut self.chunks[idx]);
            }
            self.forward_released_up_to += 1;
        }
    }

    /// Write `src` at the current position, growing `length` (and
    /// zero-filling any gap) as needed. Returns the number of bytes written
    /// (always `src.len()` on success).
    pub fn write(&mut self, src: &[u8]) -> Result<usize> {
        self.ensure_read_write()?;
        if src.is_empty() {
            return Ok(0);
        }
        let chunk_size = self.chunk_size();
        let end_pos = self.position.checked_add(src.len() as u64).ok_or_else(|| {
            Error::InvalidArgument("position + write length overflows u64".into())
        })?;
        self.check_size_bound(end_pos)?;

        if self.position > self.length {
            self.zero_fill_grow(self.position);
            self.length = self.position;
        }

        let mut done = 0usize;
        let mut pos = self.position;
        while done < src.len() {
            let idx = chunk_index(chunk_size, pos);
            let off = chunk_offset(chunk_size, pos);
            let take = (chunk_size - off).min(src.len() - done);

            self.ensure_capacity(idx + 1);
            if self.chunks[idx].is_null() {
                let clear = off != 0 || self.length > pos;
                self.chunks[idx] = self.pool.rent(clear);
            }
            self.chunks[idx].view_mut(off, take).copy_from_slice(&src[done..done + take]);

            done += take;
            pos += take as u64;
        }
        self.position = pos;
        self.length = self.length.max(self.position);
        Ok(done)
    }

    /// Write a single byte at the current position.
    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write(&[byte])?;
        Ok(())
    }

    /// Seek to a new absolute position.
    pub fn seek(&mut self, origin: SeekOrigin) -> Result<u64> {
        self.ensure_not_disposed()?;
        let new_pos = match origin {
            SeekOrigin::Begin(off) => off,
            SeekOrigin::Current(delta) => add_signed(self.position, delta)?,
            SeekOrigin::End(delta) => add_signed(self.length, delta)?,
        };
        if self.state == StreamState::ReadForward && new_pos < self.position {
            return Err(Error::InvalidOperation(
                "position must be non-decreasing in the forward-only read state".into(),
            ));
        }
        self.check_size_bound(new_pos)?;
        self.position = new_pos;
        Ok(self.position)
    }

    /// Grow or shrink the logical length, per the zero-fill/release rules
    /// in the component contract. Shrinking releases chunks at indices
    /// strictly past the new length's boundary chunk.
    pub fn set_length(&mut self, new_length: u64) -> Result<()> {
        self.ensure_read_write()?;
        self.check_size_bound(new_length)?;
        let chunk_size = self.chunk_size();

        let (i_new, _) = upper_bound(chunk_size, new_length);
        let (i_old, _) = upper_bound(chunk_size, self.length);

        if i_new >= i_old {
            self.zero_fill_grow(new_length);
        } else if !self.chunks.is_empty() {
            let hi = i_old.min(self.chunks.len() - 1);
            for idx in (i_new + 1..=hi).rev() {
                if let Some(c) = self.chunks.get_mut(idx) {
                    if !c.is_null() {
                        self.pool.return_chunk(c)?;
                    }
                }
            }
            tracing::debug!(new_length, old_length = self.length, "set_length released chunks");
        }

        self.length = new_length;
        self.position = self.position.min(self.length);
        Ok(())
    }

    /// Invoke `action` once per chunk touched by `[from, to)`, passing a
    /// mutable borrowed view of that chunk's in-range bytes. Holes are
    /// materialized into cleared pool chunks so every callback sees real,
    /// borrowable memory. Does not itself change `position` or `length`;
    /// if `action` does, the next iteration step fails with
    /// [`Error::StreamMutatedDuringIteration`].
    pub fn for_each<F>(&mut self, from: u64, to: u64, mut action: F) -> Result<()>
    where
        F: FnMut(&mut [u8]) -> Result<()>,
    {
        self.ensure_not_disposed()?;
        if from > to {
            return Err(Error::ReversedRange { from, to });
        }
        if to > self.length {
            return Err(Error::InvalidArgument(format!(
                "range end {to} exceeds stream length {}",
                self.length
            )));
        }
        if from == to {
            return Ok(());
        }

        let chunk_size = self.chunk_size();
        let snapshot_pos = self.position;
        let snapshot_len = self.length;
        let i_from = chunk_index(chunk_size, from);
        let o_from = chunk_offset(chunk_size, from);
        let (i_to, o_to) = upper_bound(chunk_size, to);

        for idx in i_from..=i_to {
            self.ensure_capacity(idx + 1);
            if self.chunks[idx].is_null() {
                self.chunks[idx] = self.pool.rent(true);
                tracing::trace!(idx, "hole materialized for iteration");
            }
            let start = if idx == i_from { o_from } else { 0 };
            let end = if idx == i_to { o_to } else { chunk_size };

            action(self.chunks[idx].view_mut(start, end - start))?;

            if self.position != snapshot_pos || self.length != snapshot_len {
                return Err(Error::StreamMutatedDuringIteration);
            }
        }
        Ok(())
    }

    /// Async counterpart to [`ChunkedStream::for_each`]. Each chunk's
    /// in-range bytes are copied into an owned `Vec<u8>` handed to
    /// `action`, since a borrowed slice's lifetime can't be threaded
    /// through an arbitrary returned future without generic associated
    /// types; `action`'s mutations are copied back before the next chunk is
    /// visited. Suspension only happens between chunks, never mid-copy.
    pub async fn for_each_async<F, Fut>(&mut self, from: u64, to: u64, mut action: F) -> Result<()>
    where
        F: FnMut(Vec<u8>) -> Fut,
        Fut: std::future::Future<Output = Result<Vec<u8>>>,
    {
        self.ensure_not_disposed()?;
        if from > to {
            return Err(Error::ReversedRange { from, to });
        }
        if to > self.length {
            return Err(Error::InvalidArgument(format!(
                "range end {to} exceeds stream length {}",
                self.length
            )));
        }
        if from == to {
            return Ok(());
        }

        let chunk_size = self.chunk_size();
        let snapshot_pos = self.position;
        let snapshot_len = self.length;
        let i_from = chunk_index(chunk_size, from);
        let o_from = chunk_offset(chunk_size, from);
        let (i_to, o_to) = upper_bound(chunk_size, to);

        for idx in i_from..=i_to {
            self.ensure_capacity(idx + 1);
            if self.chunks[idx].is_null() {
                self.chunks[idx] = self.pool.rent(true);
            }
            let start = if idx == i_from { o_from } else { 0 };
            let end = if idx == i_to { o_to } else { chunk_size };
            let len = end - start;

            let snapshot = self.chunks[idx].view(start, len).to_vec();
            let written = action(snapshot).await?;
            if written.len() != len {
                return Err(Error::InvalidArgument(format!(
                    "for_each_async callback returned {} bytes, expected {len}",
                    written.len()
                )));
            }
            self.chunks[idx].view_mut(start, len).copy_from_slice(&written);

            if self.position != snapshot_pos || self.length != snapshot_len {
                return Err(Error::StreamMutatedDuringIteration);
            }
        }
        Ok(())
    }

    /// Copy `[position, length)` to `sink`, releasing each chunk to the pool
    /// as soon as it's written — except the boundary chunk at `position`
    /// when it isn't chunk-aligned, since that chunk still holds retained
    /// bytes before `position` — then truncate the stream to
    /// `[0, position)` by setting `length = position`.
    pub fn move_to<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        self.ensure_not_disposed()?;
        let from = self.position;
        let to = self.length;
        if from >= to {
            self.length = from;
            return Ok(());
        }

        let chunk_size = self.chunk_size();
        let i_from = chunk_index(chunk_size, from);
        let o_from = chunk_offset(chunk_size, from);
        let (i_to, o_to) = upper_bound(chunk_size, to);

        let mut zero_buf: Vec<u8> = Vec::new();
        for idx in i_from..=i_to {
            let start = if idx == i_from { o_from } else { 0 };
            let end = if idx == i_to { o_to } else { chunk_size };
            let len = end - start;

            match self.chunks.get_mut(idx) {
                Some(c) if !c.is_null() => {
                    sink.write_all(c.view(start, len))?;
                    // The boundary chunk at `i_from` still holds retained
                    // bytes `[i_from*chunk_size, from)` when `o_from != 0`;
                    // only chunks fully contained in `[from, to)` can be
                    // returned to the pool.
                    if idx != i_from || o_from == 0 {
                        self.pool.return_chunk(c)?;
                    }
                }
                _ => {
                    if zero_buf.len() < len {
                        zero_buf.resize(len, 0);
                    }
                    sink.write_all(&zero_buf[..len])?;
                }
            }
        }
        self.length = from;
        Ok(())
    }

    /// Async, cancellable counterpart to [`ChunkedStream::move_to`]. On
    /// completion without cancellation, truncates to `[0, from)` exactly
    /// like the synchronous `move_to`. Cancellation is checked only at
    /// chunk boundaries; a chunk already released before cancellation is
    /// observed stays released, and `length`/`position` are left at the
    /// position reached by the last fully processed chunk.
    pub async fn move_to_async<S: AsyncByteSink>(
        &mut self,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.ensure_not_disposed()?;
        let from = self.position;
        let to = self.length;
        if from >= to {
            self.length = from;
            return Ok(());
        }

        let chunk_size = self.chunk_size();
        let i_from = chunk_index(chunk_size, from);
        let o_from = chunk_offset(chunk_size, from);
        let (i_to, o_to) = upper_bound(chunk_size, to);

        let mut zero_buf: Vec<u8> = Vec::new();
        let mut reached = from;
        let mut cancelled = false;
        for idx in i_from..=i_to {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let start = if idx == i_from { o_from } else { 0 };
            let end = if idx == i_to { o_to } else { chunk_size };
            let len = end - start;

            match self.chunks.get_mut(idx) {
                Some(c) if !c.is_null() => {
                    sink.write_all(c.view(start, len).to_vec().as_slice()).await?;
                    // See `move_to`: the boundary chunk at `i_from` still
                    // holds retained bytes when `o_from != 0`.
                    if idx != i_from || o_from == 0 {
                        self.pool.return_chunk(c)?;
                    }
                }
                _ => {
                    if zero_buf.len() < len {
                        zero_buf.resize(len, 0);
                    }
                    sink.write_all(&zero_buf[..len]).await?;
                }
            }
            reached += len as u64;
        }
        if cancelled {
            self.length = reached;
            self.position = reached;
        } else {
            self.length = from;
            self.position = from;
        }
        Ok(())
    }

    /// Materialize the whole stream into a fresh `Vec<u8>`, without
    /// disturbing `position`.
    pub fn to_array(&mut self) -> Result<Vec<u8>> {
        self.ensure_not_disposed()?;
        if self.state == StreamState::ReadForward {
            return Err(Error::InvalidOperation(
                "to_array seeks to 0, which is a backward seek in the forward-only read state".into(),
            ));
        }
        let saved_pos = self.position;
        self.position = 0;
        let mut out = vec![0u8; self.length as usize];
        self.read(&mut out)?;
        self.position = saved_pos;
        Ok(out)
    }

    /// Enter the forward-only read state at `from`: only monotonically
    /// non-decreasing reads/seeks are permitted afterward, and each chunk is
    /// released to the pool as soon as it is fully consumed. There is no
    /// transition back to `ReadWrite` — only to `Disposed`.
    pub fn as_output_stream(&mut self, from: u64) -> Result<()> {
        self.ensure_read_write()?;
        self.check_size_bound(from)?;
        self.position = from;
        self.forward_released_up_to = chunk_index(self.chunk_size(), from);
        self.state = StreamState::ReadForward;
        Ok(())
    }

    /// Writable capacity remaining in the chunk covering the current
    /// position, without renting anything. Used by
    /// [`crate::buffer_writer::BufferWriter::get_span`] to decide between
    /// the in-chunk fast path and a temporary buffer.
    pub(crate) fn in_chunk_capacity(&self) -> usize {
        self.chunk_size() - chunk_offset(self.chunk_size(), self.position)
    }

    /// Rent the chunk covering the current position if it is a hole, and
    /// return a mutable view of `len` bytes starting at the in-chunk
    /// offset of the current position.
    pub(crate) fn chunk_span_mut(&mut self, len: usize) -> &mut [u8] {
        let chunk_size = self.chunk_size();
        let idx = chunk_index(chunk_size, self.position);
        let off = chunk_offset(chunk_size, self.position);
        self.ensure_capacity(idx + 1);
        if self.chunks[idx].is_null() {
            let clear = off != 0 || self.length > self.position;
            self.chunks[idx] = self.pool.rent(clear);
        }
        self.chunks[idx].view_mut(off, len)
    }

    /// Advance `position`/`length` by `count` without copying, for bytes
    /// already written in place via [`ChunkedStream::chunk_span_mut`].
    pub(crate) fn commit_span(&mut self, count: usize) {
        self.position += count as u64;
        self.length = self.length.max(self.position);
    }

    /// Idempotently dispose the stream: returns every non-null chunk to the
    /// pool in descending index order, returns the chunk array to its pool,
    /// and zeros `length`/`position`. After disposal, every operation
    /// except another `dispose` fails with [`Error::Disposed`].
    ///
    /// Best-effort: an internal chunk-return failure is logged rather than
    /// surfaced, per the crate's propagation policy for `dispose`.
    pub fn dispose(&mut self) {
        if self.state == StreamState::Disposed {
            return;
        }
        for idx in (0..self.chunks.len()).rev() {
            if !self.chunks[idx].is_null() {
                if let Err(err) = self.pool.return_chunk(&mut self.chunks[idx]) {
                    tracing::warn!(idx, %err, "dispose: failed to return chunk, leaking it");
                }
            }
        }
        let old = std::mem::take(&mut self.chunks);
        self.array_pool.return_array(old, false);
        self.length = 0;
        self.position = 0;
        self.state = StreamState::Disposed;
        tracing::debug!("stream disposed");
    }
}

impl Drop for ChunkedStream {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn add_signed(base: u64, delta: i64) -> Result<u64> {
    if delta >= 0 {
        base.checked_add(delta as u64)
            .ok_or_else(|| Error::InvalidArgument("seek overflowed".into()))
    } else {
        base.checked_sub(delta.unsigned_abs())
            .ok_or_else(|| Error::InvalidArgument("seek underflowed below zero".into()))
    }
}

impl io::Read for ChunkedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        ChunkedStream::read(self, buf).map_err(Into::into)
    }
}

impl io::Write for ChunkedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ChunkedStream::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for ChunkedStream {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let origin = match pos {
            io::SeekFrom::Start(off) => SeekOrigin::Begin(off),
            io::SeekFrom::Current(off) => SeekOrigin::Current(off),
            io::SeekFrom::End(off) => SeekOrigin::End(off),
        };
        ChunkedStream::seek(self, origin).map_err(Into::into)
    }
}
