//! Structured logging setup.

use tracing_subscriber::EnvFilter;

const LEVEL_ENV: &str = "PORTUNIX_LOG_LEVEL";

/// Installs the global `tracing` subscriber. Call once from `main`.
/// Defaults to `info`; `PORTUNIX_LOG_LEVEL` overrides it with
/// `error|warn|info|debug`. All transports that must keep stdout clean for
/// protocol framing (MCP stdio, plugin RPC) rely on this writing to
/// stderr, never stdout.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LEVEL_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
