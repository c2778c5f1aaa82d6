//! Tracing initialization
//!
//! The library itself only emits `tracing` events; binaries and tests that
//! embed the audit service can call [`init_tracing`] to get structured JSON
//! output with env-filter support.

use tracing_subscriber::EnvFilter;

/// Initialize tracing with JSON formatting.
///
/// The level argument is an env-filter directive (e.g. `"info"` or
/// `"warden_audit=debug"`); `RUST_LOG` still takes precedence through the
/// filter. Calling this more than once is a no-op.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init();
}
