//! Opt-in tracing for tests.

use tracing_subscriber::EnvFilter;

/// Initialize a tracing subscriber honoring `RUST_LOG`. Safe to call from
/// every test; repeat calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
