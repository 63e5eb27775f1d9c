// SPDX-License-Identifier: MIT
//
// The minimal byte-sink contract `move_to`/`move_to_async` need. Kept
// crate-local and runtime-agnostic rather than binding to `tokio::io::AsyncWrite`
// or similar, so that using this crate doesn't force a particular async
// runtime on callers.

use crate::error::Result;

/// A synchronous byte sink, as consumed by [`crate::ChunkedStream::move_to`].
///
/// Blanket-implemented for anything implementing `std::io::Write` so callers
/// can pass a `Vec<u8>`, a `File`, or any other standard writer directly.
pub trait ByteSink {
    /// Write all of `buf` to the sink.
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;
}

impl<W: std::io::Write> ByteSink for W {
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self, buf).map_err(Into::into)
    }
}

/// An asynchronous byte sink, as consumed by
/// [`crate::ChunkedStream::move_to_async`].
pub trait AsyncByteSink {
    /// Write all of `buf` to the sink.
    fn write_all(&mut self, buf: &[u8]) -> impl std::future::Future<Output = Result<()>> + Send;
}
