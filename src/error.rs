// SPDX-License-Identifier: MIT
//
// Typed error surface for the chunk pool and chunked stream. Every fallible
// operation in this crate returns `Result<T>`; nothing here is ever
// swallowed except inside `ChunkedStream::dispose`, which is best-effort by
// contract and only logs at `warn!` when something goes wrong internally.

use std::io;

/// Errors surfaced by the chunk pool and chunked stream.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A negative/invalid size, count, or range was supplied, or an
    /// arithmetic computation over a position/length overflowed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A chunk was returned to a pool that didn't lend it.
    #[error("chunk with handle {handle} does not belong to this pool")]
    ForeignChunk {
        /// The chunk's pool-relative handle (byte offset), or -1 for heap provenance.
        handle: i32,
    },

    /// An operation other than `dispose` was attempted on a disposed stream.
    #[error("operation attempted on a disposed stream")]
    Disposed,

    /// Computing a chunk index for the requested position/length would
    /// exceed the maximum representable chunk index (`i32::MAX`).
    #[error("stream size would exceed the maximum representable chunk index")]
    StreamTooLarge,

    /// `for_each`/`for_each_async` was called with `from > to`.
    #[error("reversed range: from ({from}) > to ({to})")]
    ReversedRange {
        /// Start of the requested range.
        from: u64,
        /// End of the requested range.
        to: u64,
    },

    /// A `for_each`/`for_each_async` callback mutated `position` or `length`
    /// while the iteration it was called from was still in progress.
    #[error("stream's position or length was mutated during iteration")]
    StreamMutatedDuringIteration,

    /// Attempted a write, truncate, or backward seek while the stream is in
    /// the forward-only read state entered via `as_output_stream`.
    #[error("operation not permitted in the current stream state: {0}")]
    InvalidOperation(String),

    /// A sink (or other `std::io` collaborator) failed mid-operation.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// An internal lock was poisoned by a panicking holder. Should not
    /// happen in well-behaved programs; surfaced rather than panicking so
    /// callers can decide how to react.
    #[error("internal lock was poisoned")]
    Poisoned,
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        match e {
            Error::Io(inner) => inner,
            other => io::Error::other(other),
        }
    }
}
