//! Observability configuration.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Logging and metrics settings.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct TelemetryConfig {
    /// Default log level, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    #[validate(custom(function = validation::validate_log_level))]
    pub log_level: String,

    /// Emit JSON formatted log lines.
    #[serde(default)]
    pub json: bool,

    /// Include thread names in log lines.
    #[serde(default = "default_true")]
    pub thread_names: bool,

    /// Prefix of every exported metric name.
    #[serde(default = "default_metrics_namespace")]
    #[validate(length(min = 1, max = 64))]
    pub metrics_namespace: String,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_true() -> bool {
    true
}

fn default_metrics_namespace() -> String {
    "tidvakt".into()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
            thread_names: default_true(),
            metrics_namespace: default_metrics_namespace(),
        }
    }
}
