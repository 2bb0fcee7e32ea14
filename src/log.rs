//! Structured logging for deckflow.
//!
//! Events are emitted with `tracing` at orchestration boundaries and carry
//! `request_id`, `node`, `backend` and `attempt` fields where they apply.
//!
//! Log levels:
//! - ERROR: a required node failed and the request aborts
//! - WARN: retries, fallbacks, degraded nodes, cancellation
//! - INFO: request and node start/finish
//! - DEBUG: phase boundaries and successful attempts
//!
//! Debug mode can be enabled with `--debug` flag or `DECKFLOW_DEBUG=1` env var.
//! `RUST_LOG` takes precedence over both.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Environment variable that turns on debug output.
pub const DEBUG_ENV: &str = "DECKFLOW_DEBUG";

/// Initialize logging at the default level.
pub fn init() {
    init_with_debug(false);
}

/// Initialize logging with explicit debug mode setting.
///
/// Output goes to stderr so command output on stdout stays machine-readable.
/// Calling this more than once keeps the first subscriber.
pub fn init_with_debug(debug: bool) {
    let debug_enabled = debug || env_debug();
    DEBUG_ENABLED.store(debug_enabled, Ordering::SeqCst);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug_enabled)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Check if debug mode is enabled.
pub fn is_debug() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

fn env_debug() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "deckflow=debug,warn"
    } else {
        "deckflow=info,warn"
    }
}
