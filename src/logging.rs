//! Logger initialization for hosts.

use std::sync::Once;

/// `env_filter` follows the `env_logger` filter syntax
/// (e.g. "info", "stopwatch=debug").
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
}

static INIT: Once = Once::new();

/// Installs `env_logger` once; later calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        if let Some(filter) = config.env_filter {
            builder.parse_filters(&filter);
        } else if let Ok(filter) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filter);
        } else {
            builder.filter_level(log::LevelFilter::Info);
        }
        // try_init: a test harness may already own the global logger
        if builder.try_init().is_ok() {
            log::debug!("logging initialized");
        }
    });
}
