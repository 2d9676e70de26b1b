//! # Logging
//!
//! Installs a `tracing` fmt subscriber filtered by `RUST_LOG` (default
//! `info`). A subscriber that is already installed wins; `init` then does
//! nothing.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .try_init();
    if installed.is_ok() {
        tracing::debug!("logging initialized");
    }
}
