//! Logging and tracing setup for the provider.
//!
//! Logs go to **stderr**; stdout belongs to the orchestration host. Filtering
//! follows `RUST_LOG`, for example:
//!
//! ```bash
//! # Show request/response metadata from the Nango client
//! RUST_LOG=hemmer_provider_nango::client=debug ./host
//! ```
//!
//! Request and response bodies are only logged when the provider is configured
//! with `log_http_bodies = true`, see [`ClientConfig`](crate::client::ClientConfig).

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the default logging subscriber.
///
/// Defaults to `info` when `RUST_LOG` is not set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Initialize logging with a custom default level used when `RUST_LOG` is not set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Try to initialize logging, returning false if a subscriber was already set.
///
/// Useful in tests, where several cases may race to install a subscriber.
pub fn try_init_logging() -> bool {
    subscriber("info").try_init().is_ok()
}

fn subscriber(default_level: &str) -> impl tracing::Subscriber + Send + Sync + 'static {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}
