//! Subscriber setup. `RUST_LOG`, when set, takes precedence over the
//! configured level.

use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::core::error::{PlantPulseError, PlantPulseResult};
use crate::observability::config::{LogConfig, LogFormat};

/// Build the filter: `RUST_LOG` first, then the configured directives
pub fn env_filter(config: &LogConfig) -> PlantPulseResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .map_err(|e| PlantPulseError::config(format!("Invalid log level '{}': {}", config.level, e)))
}

/// Install the global subscriber. A second call keeps the first subscriber.
pub fn init_logging(config: &LogConfig) -> PlantPulseResult<()> {
    let filter = env_filter(config)?;

    let installed = match config.format {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_names(true),
            )
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init(),
    };

    if installed.is_err() {
        warn!("Tracing subscriber already initialized, skipping initialization");
        return Ok(());
    }

    info!(format = ?config.format, "Structured logging initialized");
    Ok(())
}
