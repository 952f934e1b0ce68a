//! Prometheus-backed metrics sink
//!
//! Every sink owns a registry, so several engines (one per scope) can
//! export side by side. The metric set id is attached as a constant label.

use super::{MetricsConfig, MetricsSink, Operation, RequestToken};
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Sink recording into a dedicated Prometheus registry
#[derive(Clone)]
pub struct PrometheusMetricsSink {
    registry: Registry,
    started: CounterVec,
    finished: CounterVec,
    failed: CounterVec,
    items: CounterVec,
    duration: HistogramVec,
}

impl PrometheusMetricsSink {
    /// Create the sink and register its metrics
    pub fn new(metric_set: &str, config: &MetricsConfig) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let counter = |name: &str, help: &str| {
            CounterVec::new(
                Opts::new(name, help)
                    .namespace(config.namespace.clone())
                    .const_label("metric_set", metric_set),
                &["operation"],
            )
        };

        let started = counter("requests_started_total", "Total number of started requests")?;
        let finished = counter("requests_finished_total", "Total number of finished requests")?;
        let failed = counter("requests_failed_total", "Total number of failed requests")?;
        let items = counter("items_processed_total", "Total number of processed items")?;
        let duration = HistogramVec::new(
            HistogramOpts::new("request_duration_seconds", "Request duration in seconds")
                .namespace(config.namespace.clone())
                .const_label("metric_set", metric_set)
                .buckets(config.duration_buckets.clone()),
            &["operation"],
        )?;

        registry.register(Box::new(started.clone()))?;
        registry.register(Box::new(finished.clone()))?;
        registry.register(Box::new(failed.clone()))?;
        registry.register(Box::new(items.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            started,
            finished,
            failed,
            items,
            duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text format
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::from("# Error encoding metrics\n");
        }

        String::from_utf8(buffer).unwrap_or_else(|e| {
            tracing::error!("Failed to convert metrics to string: {}", e);
            String::from("# Error converting metrics\n")
        })
    }
}

impl MetricsSink for PrometheusMetricsSink {
    fn request_started(&self, operation: Operation) -> RequestToken {
        self.started.with_label_values(&[operation.as_str()]).inc();
        RequestToken::new(operation)
    }

    fn request_finished(&self, token: RequestToken, item_count: u64, elapsed: Duration) {
        let op = token.operation().as_str();
        self.finished.with_label_values(&[op]).inc();
        self.items.with_label_values(&[op]).inc_by(item_count as f64);
        self.duration
            .with_label_values(&[op])
            .observe(elapsed.as_secs_f64());
    }

    fn request_failed(&self, token: RequestToken) {
        self.failed
            .with_label_values(&[token.operation().as_str()])
            .inc();
    }
}

impl std::fmt::Debug for PrometheusMetricsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetricsSink").finish_non_exhaustive()
    }
}
