//! Structured logging with `tracing`.
//!
//! `RUST_LOG` wins over the configured level when it is set.

use std::error::Error;

use tidvakt_config::TelemetryConfig;
use tracing::info;
use tracing_subscriber::fmt::format::{DefaultFields, FmtSpan, Format};
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::{fmt, EnvFilter};

/// Error returned when a global subscriber is already installed.
pub type InitError = Box<dyn Error + Send + Sync + 'static>;

fn builder(config: &TelemetryConfig) -> SubscriberBuilder<DefaultFields, Format, EnvFilter> {
    fmt()
        .with_env_filter(env_filter(config))
        .with_thread_names(config.thread_names)
        .with_span_events(FmtSpan::CLOSE)
}

/// Filter from `RUST_LOG`, falling back to the configured level.
pub fn env_filter(config: &TelemetryConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

/// Install the global subscriber.
///
/// # Panics
///
/// Panics if a global subscriber is already set.
pub fn init(config: &TelemetryConfig) {
    if config.json {
        builder(config).json().init();
    } else {
        builder(config).init();
    }
    info!(level = %config.log_level, json = config.json, "logging initialised");
}

/// Like [`init`], but reports an existing subscriber instead of panicking.
pub fn try_init(config: &TelemetryConfig) -> Result<(), InitError> {
    if config.json {
        builder(config).json().try_init()?;
    } else {
        builder(config).try_init()?;
    }
    info!(level = %config.log_level, json = config.json, "logging initialised");
    Ok(())
}
