// SPDX-License-Identifier: MIT
//
// Benchmarks the chunk pool's rent/return throughput under single-threaded
// and multi-threaded contention, and the chunked stream's sequential write
// path.

use std::sync::Arc;
use std::thread;

use chunked_stream::{ChunkPool, ChunkedStream};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn bench_single_threaded_rent_return(c: &mut Criterion) {
    let pool = ChunkPool::new(64, 1024).unwrap();
    c.bench_function("rent_return/single_thread", |b| {
        b.iter(|| {
            let mut chunk = pool.rent(false);
            chunk.view_mut(0, 8).fill(1);
            pool.return_chunk(&mut chunk).unwrap();
        })
    });
}

fn bench_contended_rent_return(c: &mut Criterion) {
    let mut group = c.benchmark_group("rent_return/contended");
    for &threads in &[2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let pool = ChunkPool::new(64, 16).unwrap();
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let pool = Arc::clone(&pool);
                        thread::spawn(move || {
                            for _ in 0..200 {
                                let mut chunk = pool.rent(false);
                                pool.return_chunk(&mut chunk).unwrap();
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
            })
        });
    }
    group.finish();
}

fn bench_sequential_stream_write(c: &mut Criterion) {
    c.bench_function("chunked_stream/sequential_write_64kib", |b| {
        let data = vec![0xABu8; 64 * 1024];
        b.iter(|| {
            let pool = ChunkPool::new(4096, 64).unwrap();
            let mut stream = ChunkedStream::new(pool);
            stream.write(&data).unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_single_threaded_rent_return,
    bench_contended_rent_return,
    bench_sequential_stream_write,
);
criterion_main!(benches);
