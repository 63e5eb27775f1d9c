// SPDX-License-Identifier: MIT
//
// Shared test support. Lives under tests/common/ rather than directly in
// tests/ so cargo doesn't treat it as its own integration test binary.

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a `tracing_subscriber` fmt layer driven by `RUST_LOG`, once per
/// test binary. Useful for watching this crate's `trace!`/`debug!` events
/// while chasing down a failing test locally; a no-op unless `RUST_LOG` is
/// set.
#[allow(dead_code)]
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}
