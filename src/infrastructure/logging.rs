//! Tracing setup: env-filter, json or pretty output, optional
//! non-blocking daily-rotated file logging.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::domain::models::config::LoggingConfig;

/// Initialize the global subscriber. Returns the appender guard when
/// file logging is configured; dropping it flushes pending output.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));
    let json = config.format == "json";

    if let Some(directory) = &config.directory {
        let appender = tracing_appender::rolling::daily(directory, "thermoflock.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false);
        if json {
            builder.json().init();
        } else {
            builder.init();
        }
        Some(guard)
    } else {
        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        if json {
            builder.json().init();
        } else {
            builder.init();
        }
        None
    }
}
