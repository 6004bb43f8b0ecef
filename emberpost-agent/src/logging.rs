//! Logging initialization for emberpost-agent.
//!
//! Structured JSON would be noisy for a side-car started by hand, so the
//! subscriber uses the compact format. Logs go to stderr; stdout is
//! reserved for the dry-run and test tables.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before any tracing macros are used.
/// The verbosity flag maps to a default filter level; `RUST_LOG`
/// takes precedence when set.
pub fn init(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
