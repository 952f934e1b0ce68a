//! Configuration for metrics collection
//!
//! Controls whether the Prometheus sink is installed and how its metrics
//! are named.

use serde::{Deserialize, Serialize};

/// Configuration for metrics collection and export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Install the Prometheus sink; otherwise metrics are dropped
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Namespace prefix of every metric name
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Buckets of the duration histogram, in seconds
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            namespace: default_namespace(),
            duration_buckets: default_duration_buckets(),
        }
    }
}

impl MetricsConfig {
    /// Create a configuration with metrics disabled
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.namespace.trim().is_empty() {
            return Err("namespace must not be empty".to_string());
        }
        if self.duration_buckets.is_empty() {
            return Err("duration_buckets must not be empty".to_string());
        }
        if self.duration_buckets.windows(2).any(|w| w[0] >= w[1]) {
            return Err("duration_buckets must be strictly increasing".to_string());
        }
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}

fn default_namespace() -> String {
    "facet_search".to_string()
}

fn default_duration_buckets() -> Vec<f64> {
    vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
}
