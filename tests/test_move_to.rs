// SPDX-License-Identifier: MIT
//
// `move_to`/`move_to_async` release chunks as they're drained and leave the
// stream truncated to `[0, position)`.

use chunked_stream::{CancellationToken, ChunkPool, ChunkedStream, SeekOrigin};

fn test_stream(chunk_size: usize) -> ChunkedStream {
    ChunkedStream::new(ChunkPool::new(chunk_size, 64).unwrap())
}

#[test]
fn move_to_empty_range_is_a_no_op() {
    let mut s = test_stream(4);
    s.write(&[1, 2, 3]).unwrap();
    s.seek(SeekOrigin::Begin(3)).unwrap();
    let mut sink = Vec::new();
    s.move_to(&mut sink).unwrap();
    assert!(sink.is_empty());
    assert_eq!(s.len(), 3);
}

#[test]
fn move_to_whole_stream_drains_it_to_zero_length() {
    let mut s = test_stream(3);
    s.write(&[9, 8, 7, 6, 5, 4, 3, 2, 1]).unwrap();
    s.seek(SeekOrigin::Begin(0)).unwrap();
    let mut sink = Vec::new();
    s.move_to(&mut sink).unwrap();
    assert_eq!(sink, vec![9, 8, 7, 6, 5, 4, 3, 2, 1]);
    assert_eq!(s.len(), 0);
}

#[test]
fn move_to_over_a_hole_emits_zeros() {
    let mut s = test_stream(4);
    s.set_length(12).unwrap();
    s.seek(SeekOrigin::Begin(0)).unwrap();
    let mut sink = Vec::new();
    s.move_to(&mut sink).unwrap();
    assert_eq!(sink, vec![0u8; 12]);
}

#[tokio::test]
async fn move_to_async_drains_and_respects_cancellation() {
    struct VecSink(Vec<u8>);
    impl chunked_stream::AsyncByteSink for VecSink {
        async fn write_all(&mut self, buf: &[u8]) -> chunked_stream::Result<()> {
            self.0.extend_from_slice(buf);
            Ok(())
        }
    }

    let mut s = test_stream(2);
    s.write(&[1, 2, 3, 4, 5, 6]).unwrap();
    s.seek(SeekOrigin::Begin(0)).unwrap();

    let mut sink = VecSink(Vec::new());
    let cancel = CancellationToken::new();
    s.move_to_async(&mut sink, &cancel).await.unwrap();

    assert_eq!(sink.0, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(s.len(), 0);
}

#[tokio::test]
async fn move_to_async_from_mid_stream_retains_boundary_chunk_prefix() {
    struct VecSink(Vec<u8>);
    impl chunked_stream::AsyncByteSink for VecSink {
        async fn write_all(&mut self, buf: &[u8]) -> chunked_stream::Result<()> {
            self.0.extend_from_slice(buf);
            Ok(())
        }
    }

    let mut s = test_stream(2);
    s.write(&[0, 1, 2, 3, 4, 5]).unwrap();
    s.seek(SeekOrigin::Begin(3)).unwrap();

    let mut sink = VecSink(Vec::new());
    let cancel = CancellationToken::new();
    s.move_to_async(&mut sink, &cancel).await.unwrap();

    assert_eq!(sink.0, vec![3, 4, 5]);
    assert_eq!(s.len(), 3);
    assert_eq!(s.to_array().unwrap(), vec![0, 1, 2]);
}

#[tokio::test]
async fn move_to_async_stops_early_once_cancelled() {
    struct CountingSink {
        data: Vec<u8>,
        cancel_after: usize,
        cancel: CancellationToken,
    }
    impl chunked_stream::AsyncByteSink for CountingSink {
        async fn write_all(&mut self, buf: &[u8]) -> chunked_stream::Result<()> {
            self.data.extend_from_slice(buf);
            if self.data.len() >= self.cancel_after {
                self.cancel.cancel();
            }
            Ok(())
        }
    }

    let mut s = test_stream(2);
    s.write(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();
    s.seek(SeekOrigin::Begin(0)).unwrap();

    let cancel = CancellationToken::new();
    let mut sink = CountingSink {
        data: Vec::new(),
        cancel_after: 4,
        cancel: cancel.clone(),
    };
    s.move_to_async(&mut sink, &cancel).await.unwrap();

    assert!(sink.data.len() < 10);
    assert!(cancel.is_cancelled());
}
