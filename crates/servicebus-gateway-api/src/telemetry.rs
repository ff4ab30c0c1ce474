//! Logging initialisation.

use crate::config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;

/// Filter used when neither `RUST_LOG` nor the configured level parses
const FALLBACK_FILTER: &str = "info";

/// Install the global subscriber; `RUST_LOG` overrides the configured level
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = env_filter(logging, std::env::var(EnvFilter::DEFAULT_ENV).ok());

    let (json, plain) = if logging.json_format {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .init();
}

/// First valid filter out of `rust_log`, the configured level, then `info`
fn env_filter(logging: &LoggingConfig, rust_log: Option<String>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(&logging.level).ok())
        .unwrap_or_else(|| EnvFilter::new(FALLBACK_FILTER))
}
