//! Prometheus metrics for the filters.

use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use tidvakt_config::TelemetryConfig;
use tracing::debug;

/// Counters for one filter instance, named `<namespace>_<filter>_*`.
#[derive(Debug, Clone)]
pub struct FilterMetrics {
    pub forwarded_chunks: IntCounter,
    pub forwarded_bytes: IntCounter,
    pub dropped_chunks: IntCounter,
    pub queued_chunks: IntGauge,
}

impl FilterMetrics {
    pub fn new(namespace: &str, filter: &str) -> Result<Self, prometheus::Error> {
        let opts = |name: &str, help: &str| {
            Opts::new(name, help)
                .namespace(namespace)
                .subsystem(filter)
        };
        Ok(Self {
            forwarded_chunks: IntCounter::with_opts(opts(
                "forwarded_chunks_total",
                "Chunks handed downstream",
            ))?,
            forwarded_bytes: IntCounter::with_opts(opts(
                "forwarded_bytes_total",
                "Bytes handed downstream",
            ))?,
            dropped_chunks: IntCounter::with_opts(opts(
                "dropped_chunks_total",
                "Chunks discarded without forwarding",
            ))?,
            queued_chunks: IntGauge::with_opts(opts(
                "queued_chunks",
                "Chunks waiting inside the filter",
            ))?,
        })
    }

    /// Counters under the configured metrics namespace.
    pub fn from_config(config: &TelemetryConfig, filter: &str) -> Result<Self, prometheus::Error> {
        Self::new(&config.metrics_namespace, filter)
    }

    pub fn record_forwarded(&self, bytes: usize) {
        self.forwarded_chunks.inc();
        self.forwarded_bytes.inc_by(bytes as u64);
    }

    pub fn record_dropped(&self) {
        self.dropped_chunks.inc();
    }

    pub fn set_queued(&self, queued: usize) {
        self.queued_chunks.set(queued as i64);
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder {
    registry: Registry,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn register(&self, metrics: &FilterMetrics) -> Result<(), prometheus::Error> {
        self.registry
            .register(Box::new(metrics.forwarded_chunks.clone()))?;
        self.registry
            .register(Box::new(metrics.forwarded_bytes.clone()))?;
        self.registry
            .register(Box::new(metrics.dropped_chunks.clone()))?;
        self.registry
            .register(Box::new(metrics.queued_chunks.clone()))?;
        debug!("registered filter metrics");
        Ok(())
    }

    /// Render every registered metric in the text exposition format.
    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
    }
}
