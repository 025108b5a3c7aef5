//! Diagnostic tracing for gardener runs.
//!
//! Tracing goes to stderr so it never mixes with the status line and step
//! outputs printed on stdout.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn` if unset.
///
/// # Example
/// ```bash
/// RUST_LOG=gardener=debug gardener run workflow_dispatch
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
