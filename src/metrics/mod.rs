//! Throughput metrics for search and publish operations.
//!
//! The engine reports through the [`MetricsSink`] contract:
//! - `request_started` when an operation begins, returning a token
//! - `request_finished` with item count and elapsed time on success
//! - `request_failed` on any error
//!
//! [`ThroughputRecorder`] wraps a sink and hands out in-flight guards so
//! callers never time operations themselves. Two sinks ship with the crate:
//! [`PrometheusMetricsSink`] exporting into its own registry, and
//! [`InMemoryMetricsSink`] for tests and embedders without Prometheus.
//!
//! # Example
//! ```no_run
//! use facet_search::metrics::{InMemoryMetricsSink, Operation, ThroughputRecorder};
//! use std::sync::Arc;
//!
//! let sink = Arc::new(InMemoryMetricsSink::new());
//! let recorder = ThroughputRecorder::new(sink.clone());
//!
//! let in_flight = recorder.start(Operation::Query);
//! in_flight.finished(10);
//!
//! assert_eq!(sink.snapshot(Operation::Query).finished, 1);
//! ```

mod config;
mod exporter;
mod memory;
mod recorder;

pub use self::config::MetricsConfig;
pub use exporter::PrometheusMetricsSink;
pub use memory::{InMemoryMetricsSink, OperationSnapshot};
pub use recorder::{InFlight, ThroughputRecorder};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Metered operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    DocsPublished,
    DocsRetrievedById,
    Query,
}

impl Operation {
    pub const ALL: [Operation; 3] = [
        Operation::DocsPublished,
        Operation::DocsRetrievedById,
        Operation::Query,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::DocsPublished => "docs_published",
            Operation::DocsRetrievedById => "docs_retrieved_by_id",
            Operation::Query => "query",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one started request
#[derive(Debug, Clone, Copy)]
pub struct RequestToken {
    operation: Operation,
    started: Instant,
}

impl RequestToken {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            started: Instant::now(),
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn started(&self) -> Instant {
        self.started
    }
}

/// External metrics sink
pub trait MetricsSink: Send + Sync {
    fn request_started(&self, operation: Operation) -> RequestToken;

    fn request_finished(&self, token: RequestToken, item_count: u64, elapsed: Duration);

    fn request_failed(&self, token: RequestToken);
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn request_started(&self, operation: Operation) -> RequestToken {
        RequestToken::new(operation)
    }

    fn request_finished(&self, _token: RequestToken, _item_count: u64, _elapsed: Duration) {}

    fn request_failed(&self, _token: RequestToken) {}
}

/// Metric set id of a scope's document metrics
pub fn metric_set_id(scope: &str) -> String {
    format!("facet_search.documents[{}]", scope)
}
