//! In-flight guards over a [`MetricsSink`]

use super::{MetricsSink, Operation, RequestToken};
use std::sync::Arc;

/// Records operation throughput on a sink
#[derive(Clone)]
pub struct ThroughputRecorder {
    sink: Arc<dyn MetricsSink>,
}

impl ThroughputRecorder {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }

    /// Mark an operation as started
    pub fn start(&self, operation: Operation) -> InFlight {
        let token = self.sink.request_started(operation);
        InFlight {
            sink: self.sink.clone(),
            token: Some(token),
        }
    }
}

impl std::fmt::Debug for ThroughputRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThroughputRecorder").finish_non_exhaustive()
    }
}

/// A started operation.
///
/// Dropping it without calling [`finished`](Self::finished) or
/// [`failed`](Self::failed) records a failure.
#[must_use = "an in-flight operation records a failure when dropped"]
pub struct InFlight {
    sink: Arc<dyn MetricsSink>,
    token: Option<RequestToken>,
}

impl InFlight {
    pub fn operation(&self) -> Option<Operation> {
        self.token.map(|t| t.operation())
    }

    /// Record success with the number of processed items
    pub fn finished(mut self, item_count: u64) {
        if let Some(token) = self.token.take() {
            let elapsed = token.started().elapsed();
            self.sink.request_finished(token, item_count, elapsed);
        }
    }

    pub fn failed(mut self) {
        if let Some(token) = self.token.take() {
            self.sink.request_failed(token);
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.sink.request_failed(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::InMemoryMetricsSink;

    #[test]
    fn test_finished_records_items() {
        let sink = Arc::new(InMemoryMetricsSink::new());
        let recorder = ThroughputRecorder::new(sink.clone());

        let in_flight = recorder.start(Operation::DocsPublished);
        assert_eq!(in_flight.operation(), Some(Operation::DocsPublished));
        in_flight.finished(25);

        let stats = sink.snapshot(Operation::DocsPublished);
        assert_eq!(stats.started, 1);
        assert_eq!(stats.finished, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.items, 25);
    }

    #[test]
    fn test_dropped_guard_counts_as_failure() {
        let sink = Arc::new(InMemoryMetricsSink::new());
        let recorder = ThroughputRecorder::new(sink.clone());

        recorder.start(Operation::Query).failed();
        drop(recorder.start(Operation::Query));

        let stats = sink.snapshot(Operation::Query);
        assert_eq!(stats.started, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.finished, 0);
    }
}
