use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

/// Initializes the global tracing subscriber from configuration.
///
/// `RUST_LOG` wins over the configured level when set. Safe to call more
/// than once; subsequent calls are no-ops (tests initialize per-process).
pub fn init(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if config.log_json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already initialized");
    }
}
