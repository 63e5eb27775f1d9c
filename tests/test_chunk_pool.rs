// SPDX-License-Identifier: MIT
//
// End-to-end scenarios for the chunk pool's contention and exhaustion
// behavior.

use std::sync::{Arc, Mutex};
use std::thread;

use chunked_stream::{pool_stats, ChunkPool};

// `pool_stats()` aggregates across every pool in the process, so tests that
// assert on its exact before/after delta must not run concurrently with
// each other within this test binary.
static COUNTER_TEST_LOCK: Mutex<()> = Mutex::new(());

// Scenario 1: pool under contention.
#[test]
fn pool_under_contention_single_chunk() {
    let pool = ChunkPool::new(8, 1).unwrap();
    let n = 1000;

    let handles: Vec<_> = (0..n)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || loop {
                if let Some(mut c) = pool.try_rent(false) {
                    let mut v = i32::from_le_bytes(c.view(4, 4).try_into().unwrap());
                    v += 1;
                    c.view_mut(4, 4).copy_from_slice(&v.to_le_bytes());
                    pool.return_chunk(&mut c).unwrap();
                    return;
                }
                thread::yield_now();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let c = pool.try_rent(false).unwrap();
    assert_eq!(i32::from_le_bytes(c.view(0, 4).try_into().unwrap()), -1);
    assert_eq!(i32::from_le_bytes(c.view(4, 4).try_into().unwrap()), n as i32);
}

// Scenario 2: pool exhaustion falls back to heap.
#[test]
fn pool_exhaustion_falls_back_to_heap() {
    let pool = ChunkPool::new(8, 1).unwrap();
    let first = pool.rent(true);
    assert!(first.is_from_pool());
    let second = pool.rent(true);
    assert!(second.is_from_heap());
    assert_eq!(second.len(), 8);
    assert_eq!(second.view(0, 8), &[0u8; 8]);
}

#[test]
fn construction_rejects_bad_parameters() {
    assert!(ChunkPool::new(3, 10).is_err());
    assert!(ChunkPool::new(16, 0).is_err());
    assert!(ChunkPool::new(usize::MAX / 2, usize::MAX / 2).is_err());
}

#[test]
fn counters_return_to_zero_after_full_disposal() {
    let _guard = COUNTER_TEST_LOCK.lock().unwrap();
    let pool = ChunkPool::new(16, 4).unwrap();
    let before = pool_stats();
    let mut rented: Vec<_> = (0..4).map(|_| pool.rent(false)).collect();
    assert_eq!(
        pool_stats().total_pool_allocated,
        before.total_pool_allocated + 16 * 4
    );
    for c in rented.iter_mut() {
        pool.return_chunk(c).unwrap();
    }
    assert_eq!(pool_stats().total_pool_allocated, before.total_pool_allocated);
}
