// SPDX-License-Identifier: MIT
//
// A scatter/gather write adapter over a chunked stream: `get_span` hands
// the caller a writable region to fill in place, `advance` commits however
// much of it was actually used. Avoids an intermediate copy whenever the
// requested size fits the remainder of the current chunk.

use crate::error::{Error, Result};
use crate::stream::ChunkedStream;

/// Bookkeeping for the in-flight span between a `get_span` call and its
/// matching `advance`.
enum PendingSpan {
    /// No `get_span` has been granted since the last `advance`.
    None,
    /// A borrowed view directly into a stream chunk; `usize` is the number
    /// of bytes granted, so `advance` can reject an over-large commit.
    InChunk(usize),
    /// An oversize request that didn't fit the current chunk; writing
    /// through this goes through the stream's normal `write` path on
    /// `advance`.
    Temporary(Vec<u8>),
}

/// Scatter/gather writer over a [`ChunkedStream`].
///
/// `get_span`/`advance` must alternate exactly: each `get_span` must be
/// followed by exactly one `advance` before the next `get_span`.
pub struct BufferWriter<'a> {
    stream: &'a mut ChunkedStream,
    pending: PendingSpan,
}

impl<'a> BufferWriter<'a> {
    /// Wrap `stream` for scatter/gather writes.
    pub fn new(stream: &'a mut ChunkedStream) -> Self {
        BufferWriter {
            stream,
            pending: PendingSpan::None,
        }
    }

    /// Request a writable region of at least `size_hint` bytes (or, for
    /// `size_hint == 0`, whatever remains in the current chunk). The
    /// returned slice may be shorter than `size_hint` when it's an
    /// in-chunk view; check its length before writing.
    ///
    /// # Panics
    /// Panics if called again before the previous span's `advance`.
    pub fn get_span(&mut self, size_hint: usize) -> &mut [u8] {
        assert!(
            matches!(self.pending, PendingSpan::None),
            "get_span called without a matching advance for the previous span"
        );

        let remaining = self.stream.in_chunk_capacity();
        if size_hint == 0 || size_hint <= remaining {
            self.pending = PendingSpan::InChunk(remaining);
            self.stream.chunk_span_mut(remaining)
        } else {
            self.pending = PendingSpan::Temporary(vec![0u8; size_hint]);
            match &mut self.pending {
                PendingSpan::Temporary(buf) => buf.as_mut_slice(),
                _ => unreachable!(),
            }
        }
    }

    /// Commit `count` bytes of the span granted by the last `get_span`.
    ///
    /// For an in-chunk span this only adjusts `position`/`length` (the
    /// bytes were already written in place). For a temporary span this
    /// writes the first `count` bytes through the stream's normal write
    /// path and releases the temporary buffer.
    pub fn advance(&mut self, count: usize) -> Result<()> {
        match std::mem::replace(&mut self.pending, PendingSpan::None) {
            PendingSpan::InChunk(granted) => {
                if count > granted {
                    return Err(Error::InvalidArgument(format!(
                        "advance({count}) exceeds the {granted}-byte span granted by get_span"
                    )));
                }
                self.stream.commit_span(count);
                Ok(())
            }
            PendingSpan::Temporary(buf) => {
                if count > buf.len() {
                    return Err(Error::InvalidArgument(format!(
                        "advance({count}) exceeds the {}-byte span granted by get_span",
                        buf.len()
                    )));
                }
                self.stream.write(&buf[..count])?;
                Ok(())
            }
            PendingSpan::None => Err(Error::InvalidArgument(
                "advance called with no span outstanding".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_pool::ChunkPool;

    #[test]
    fn in_chunk_span_avoids_copy_and_commits_directly() {
        let pool = ChunkPool::new(4, 8).unwrap();
        let mut stream = ChunkedStream::new(pool);
        {
            let mut w = BufferWriter::new(&mut stream);
            let span = w.get_span(2);
            span[0] = 1;
            span[1] = 2;
            w.advance(2).unwrap();
        }
        assert_eq!(stream.len(), 2);
        assert_eq!(stream.to_array().unwrap(), vec![1, 2]);
    }

    #[test]
    fn oversize_span_uses_temporary_and_writes_through() {
        let pool = ChunkPool::new(4, 8).unwrap();
        let mut stream = ChunkedStream::new(pool);
        {
            let mut w = BufferWriter::new(&mut stream);
            let span = w.get_span(10);
            assert!(span.len() >= 10);
            for (i, b) in span.iter_mut().enumerate().take(10) {
                *b = i as u8;
            }
            w.advance(10).unwrap();
        }
        assert_eq!(stream.to_array().unwrap(), (0u8..10).collect::<Vec<_>>());
    }

    #[test]
    fn advance_without_get_span_fails() {
        let pool = ChunkPool::new(4, 8).unwrap();
        let mut stream = ChunkedStream::new(pool);
        let mut w = BufferWriter::new(&mut stream);
        assert!(w.advance(1).is_err());
    }

    #[test]
    fn advance_past_granted_span_fails() {
        let pool = ChunkPool::new(4, 8).unwrap();
        let mut stream = ChunkedStream::new(pool);
        let mut w = BufferWriter::new(&mut stream);
        let span_len = w.get_span(2).len();
        assert!(w.advance(span_len + 1).is_err());
    }
}
