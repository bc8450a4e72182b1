//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when neither `RUST_LOG` nor the config provides one.
pub const DEFAULT_LOG_FILTER: &str = "info,vkpresent=debug";

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. Calling this more than
/// once is harmless; later calls leave the first subscriber in place.
///
/// # Example
/// ```
/// vkpresent_core::init_logging(vkpresent_core::DEFAULT_LOG_FILTER);
/// tracing::info!("Renderer starting");
/// ```
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
