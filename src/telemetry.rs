//! Structured logging setup shared by every binary.
//!
//! Grounded on the `tracing_subscriber::registry().with(EnvFilter).with(fmt
//! layer).init()` pattern used to bring up the server binaries in the
//! teacher crate.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install a global `tracing` subscriber honoring `RUST_LOG`, defaulting to
/// `info` when unset or malformed.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
