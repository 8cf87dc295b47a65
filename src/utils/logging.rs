// src/utils/logging.rs
use tracing_subscriber::{fmt, EnvFilter};

// Without RUST_LOG, show this tool's progress logs but keep the HTTP stack
// internals quiet.
const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn";

/// Sets up the logging framework using tracing_subscriber.
/// Reads log level filters from the `RUST_LOG` environment variable,
/// falling back to [`DEFAULT_FILTER`] when it is unset.
pub fn setup_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .init();

    tracing::debug!("Logging setup complete.");
}
