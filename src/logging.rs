//! Tracing setup for binaries and tests.
//!
//! The library itself only emits events; embedders opt in to a subscriber
//! here. `RUST_LOG` wins over the provided default directives.

use tracing_subscriber::EnvFilter;

/// Install a formatted subscriber at `info` unless `RUST_LOG` says otherwise.
pub fn init() {
    init_with_filter("info");
}

/// Install a formatted subscriber with the given default directives.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_with_filter(directives: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
