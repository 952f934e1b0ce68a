//! Atomic in-process metrics sink

use super::{MetricsSink, Operation, RequestToken};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct OperationStats {
    started: AtomicU64,
    finished: AtomicU64,
    failed: AtomicU64,
    items: AtomicU64,
    elapsed_ms: AtomicU64,
}

/// Point-in-time counters of one operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationSnapshot {
    pub started: u64,
    pub finished: u64,
    pub failed: u64,
    pub items: u64,
    pub elapsed_ms: u64,
}

impl OperationSnapshot {
    /// Started but neither finished nor failed
    pub fn in_flight(&self) -> u64 {
        self.started.saturating_sub(self.finished + self.failed)
    }
}

/// Sink keeping counters per operation in memory
#[derive(Debug, Default)]
pub struct InMemoryMetricsSink {
    stats: DashMap<Operation, OperationStats>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, operation: Operation) -> OperationSnapshot {
        self.stats
            .get(&operation)
            .map(|s| OperationSnapshot {
                started: s.started.load(Ordering::Relaxed),
                finished: s.finished.load(Ordering::Relaxed),
                failed: s.failed.load(Ordering::Relaxed),
                items: s.items.load(Ordering::Relaxed),
                elapsed_ms: s.elapsed_ms.load(Ordering::Relaxed),
            })
            .unwrap_or_default()
    }

    fn with_stats(&self, operation: Operation, f: impl FnOnce(&OperationStats)) {
        let stats = self.stats.entry(operation).or_default();
        f(stats.value());
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn request_started(&self, operation: Operation) -> RequestToken {
        self.with_stats(operation, |s| {
            s.started.fetch_add(1, Ordering::Relaxed);
        });
        RequestToken::new(operation)
    }

    fn request_finished(&self, token: RequestToken, item_count: u64, elapsed: Duration) {
        self.with_stats(token.operation(), |s| {
            s.finished.fetch_add(1, Ordering::Relaxed);
            s.items.fetch_add(item_count, Ordering::Relaxed);
            s.elapsed_ms
                .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        });
    }

    fn request_failed(&self, token: RequestToken) {
        self.with_stats(token.operation(), |s| {
            s.failed.fetch_add(1, Ordering::Relaxed);
        });
    }
}
