//! # tidvakt configuration
//!
//! Layered configuration for the virtual clock and the traffic-shaping
//! filters. Every section carries named, defaulted fields and is validated
//! once after loading.

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod clock;
mod error;
mod filter;
mod telemetry;
mod validation;

pub use clock::{ClockBackend, ClockConfig};
pub use error::{format_validation_errors, ConfigError};
pub use filter::{DelayFilterConfig, TokenBucketConfig, KBIT, MBIT};
pub use telemetry::TelemetryConfig;

/// Base configuration file, relative to the working directory.
pub const BASE_CONFIG_FILE: &str = "config/tidvakt.yaml";

/// Prefix of environment variable overrides (`TIDVAKT_DELAY__DELAY_MS=20`).
pub const ENV_PREFIX: &str = "TIDVAKT_";

/// Top-level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct TidvaktConfig {
    /// Time source selection.
    #[serde(default)]
    #[validate(nested)]
    pub clock: ClockConfig,

    /// Delay filter parameters.
    #[serde(default)]
    #[validate(nested)]
    pub delay: DelayFilterConfig,

    /// Token bucket filter parameters.
    #[serde(default)]
    #[validate(nested)]
    pub token_bucket: TokenBucketConfig,

    /// Logging and metrics.
    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl TidvaktConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/tidvakt.yaml`, if present
    /// 3. `config/<TIDVAKT_ENV>.yaml`, if present (`TIDVAKT_ENV` defaults to `development`)
    /// 4. `TIDVAKT_*` environment variables, `__` separating sections
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(TidvaktConfig::default()));

        if Path::new(BASE_CONFIG_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_CONFIG_FILE));
        }

        let env = std::env::var("TIDVAKT_ENV").unwrap_or_else(|_| "development".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::extract(figment)
    }

    /// Load configuration from a specific path, with environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        let figment =
            Figment::from(Serialized::defaults(TidvaktConfig::default())).merge(Yaml::file(path));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
