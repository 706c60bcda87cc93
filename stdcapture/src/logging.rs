//! Development-time tracing for debugging capture sessions.
//!
//! Diagnostics go through [`runtime::stderr`]. The library itself only logs
//! before a session redirects anything or after it has restored every
//! destination, so captured bytes never contain its own log lines. Events the
//! caller emits while runtime-err is captured land in the capture.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::io::runtime;

/// Initialize tracing subscriber for development logging.
///
/// Reads `RUST_LOG` env var. Defaults to `warn` if unset.
/// Output: runtime stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=stdcapture=debug cargo run -- probe
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(runtime::stderr).compact())
        .init();
}
