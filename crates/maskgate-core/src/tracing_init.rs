//! Shared tracing/logging initialization.
//!
//! Sets up `tracing_subscriber` with an env-filter and either human-readable
//! or JSON output on stderr, so stdout stays free for command output.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` wins over `logging.level`; a bare level such as `"debug"` is
/// scoped to the maskgate crates.
pub fn init_tracing(logging: &LoggingConfig) {
    let default_filter = if logging.level.contains('=') {
        logging.level.clone()
    } else {
        format!("maskgate_core={0},maskgate_cli={0}", logging.level)
    };
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or(default_filter),
    );
    let registry = tracing_subscriber::registry().with(env_filter);
    // A subscriber may already be installed (tests, embedding applications).
    let _ = if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
}
