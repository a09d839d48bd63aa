//! Logging setup, kept separate from the coordination logic itself.
//!
//! `tracing`/`tracing-subscriber` are not used anywhere in the runtime
//! crate this module's siblings are grounded on, but they are this
//! repository's own logging stack elsewhere (its API server depends on
//! both); this crate carries the same pair rather than reaching for a
//! different logging ecosystem for its ambient concerns.

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber reading its filter from
/// `RUST_LOG`, defaulting to `info` when unset. Safe to call more than
/// once in a process (e.g. from repeated test setup); subsequent calls
/// are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
