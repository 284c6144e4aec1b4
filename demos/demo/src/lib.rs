//! Shared setup for the demo binaries.

use tracing_subscriber::{EnvFilter, fmt};

/// Install a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
///
/// `log` records from `ws_dispatch` are bridged through the subscriber's
/// default `tracing-log` feature, so the `[Exchange n]` lines show up too.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).init();
}
