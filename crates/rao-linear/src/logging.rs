//! Tracing subscriber setup for binaries and tests embedding the optimiser.

use tracing_subscriber::{fmt, prelude::*, registry::Registry, EnvFilter};

/// Install a stderr fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Does nothing when a global subscriber is already installed, so it can be
/// called from every test.
///
/// # Example
/// ```
/// rao_linear::logging::init_tracing();
/// tracing::info!("ready");
/// ```
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
    let _ = Registry::default().with(env_filter).with(console_layer).try_init();
}
