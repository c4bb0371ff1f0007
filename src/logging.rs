//! `tracing` subscriber setup.
//!
//! `RUST_LOG` takes precedence when set. Otherwise only this crate's events
//! (plus the HTTP trace layer) are shown, at the configured level.

use tracing_subscriber::{fmt::time::ChronoUtc, layer::SubscriberExt, util::SubscriberInitExt};
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LogConfig;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const LOG_TARGETS: &[&str] = &["search_relay", "relay", "tower_http"];

/// Builds the default filter, e.g. `search_relay=info,relay=info,tower_http=info`.
pub fn filter_string(level: &str) -> String {
    LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Installs the global subscriber. Calling it twice is harmless.
pub fn init_logging(config: &LogConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_string(&config.level)));

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()));

    let layer = if config.json {
        layer.json().flatten_event(true).boxed()
    } else {
        layer.boxed()
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init();
}
