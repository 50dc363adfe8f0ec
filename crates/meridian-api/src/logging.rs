//! Tracing subscriber setup

use meridian_core::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter,
};

/// Crates that are too chatty at the application level
const QUIET: &str = "tower_http=warn,sqlx=warn";

/// Filter directives used when `RUST_LOG` is unset
///
/// An unrecognised level falls back to `info`; `AppConfig::validate`
/// rejects such levels before startup gets here.
pub fn default_directives(config: &LoggingConfig) -> String {
    let level = config.filter_level().unwrap_or("info");
    format!("{level},{QUIET}")
}

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(config)))
}

/// Install the global subscriber
///
/// `json` emits one JSON object per line with the current span attached;
/// `console` emits coloured human-readable lines.
pub fn init(config: &LoggingConfig) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init(),
        LogFormat::Console => registry.with(fmt::layer().with_ansi(true)).try_init(),
    }
}
