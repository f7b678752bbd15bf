//! Tracing setup for binaries and examples embedding this crate

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize a fmt subscriber honoring `RUST_LOG`, defaulting to `info`
///
/// Safe to call more than once; subsequent calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
