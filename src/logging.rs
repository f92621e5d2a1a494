//! Tracing subscriber setup for the function runtime.

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Installs a global fmt subscriber.
///
/// `RUST_LOG` wins over `config.level`. Timestamps and targets are left out
/// because the log sink adds its own. Calling this twice is harmless; the
/// second call is ignored.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time();

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
