use tracing_subscriber::EnvFilter;

/// Wires test output into tracing; set `RUST_LOG` to see store internals
/// while debugging a failing test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
