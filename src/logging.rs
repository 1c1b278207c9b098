//! Tracing setup for the manager binary.
//!
//! Library code never initializes a subscriber itself; only `main.rs` does,
//! so embedding the manager in a larger scheduler doesn't fight over the
//! global subscriber.

use tracing_subscriber::EnvFilter;

/// Install a `tracing-subscriber` pulling its filter from `RUST_LOG`,
/// defaulting to `info` when unset.
pub fn init(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
