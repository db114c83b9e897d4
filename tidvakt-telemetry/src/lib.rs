//! # tidvakt telemetry
//!
//! Logging initialisation and Prometheus metrics for the traffic-shaping
//! filters.

pub mod logging;
pub mod metrics;

pub use metrics::{FilterMetrics, MetricsRecorder};
