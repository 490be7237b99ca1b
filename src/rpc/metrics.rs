//! Lightweight counters tracking RPC successes, failures, and latency so
//! clients can expose aggregated snapshots without leaking implementation
//! details to downstream consumers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub(crate) struct RpcMetrics {
    total_requests: AtomicU64,
    total_errors: AtomicU64,
    total_latency_ns: AtomicU64,
}

impl RpcMetrics {
    pub(crate) fn record_success(&self, latency: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, latency: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_errors.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RpcMetricsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_errors = self.total_errors.load(Ordering::Relaxed);
        let total_latency_ns = self.total_latency_ns.load(Ordering::Relaxed);

        let average_latency_ms = if total_requests == 0 {
            0.0
        } else {
            (total_latency_ns as f64 / total_requests as f64) / 1_000_000.0
        };

        let error_rate = if total_requests == 0 {
            0.0
        } else {
            total_errors as f64 / total_requests as f64
        };

        RpcMetricsSnapshot {
            total_requests,
            total_errors,
            average_latency_ms,
            error_rate,
        }
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub struct RpcMetricsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    pub average_latency_ms: f64,
    pub error_rate: f64,
}

impl RpcMetricsSnapshot {
    /// Combines per-client snapshots into one, with the average latency
    /// weighted by request count.
    pub fn aggregate<I>(snapshots: I) -> Self
    where
        I: IntoIterator<Item = RpcMetricsSnapshot>,
    {
        let mut total_requests = 0u64;
        let mut total_errors = 0u64;
        let mut total_latency_ms = 0.0f64;

        for snapshot in snapshots {
            total_requests += snapshot.total_requests;
            total_errors += snapshot.total_errors;
            total_latency_ms += snapshot.average_latency_ms * snapshot.total_requests as f64;
        }

        let average_latency_ms = if total_requests == 0 {
            0.0
        } else {
            total_latency_ms / total_requests as f64
        };
        let error_rate = if total_requests == 0 {
            0.0
        } else {
            total_errors as f64 / total_requests as f64
        };

        Self {
            total_requests,
            total_errors,
            average_latency_ms,
            error_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_aggregates_counts_and_latency() {
        let metrics = RpcMetrics::default();
        metrics.record_success(Duration::from_millis(10));
        metrics.record_success(Duration::from_millis(20));
        metrics.record_failure(Duration::from_millis(30));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.total_errors, 1);
        assert!((snapshot.average_latency_ms - 20.0).abs() < 0.01);
        assert!((snapshot.error_rate - 1.0 / 3.0).abs() < 0.001);
    }

    #[test]
    fn aggregate_weights_latency_by_request_count() {
        let busy = RpcMetricsSnapshot {
            total_requests: 30,
            total_errors: 3,
            average_latency_ms: 10.0,
            error_rate: 0.1,
        };
        let quiet = RpcMetricsSnapshot {
            total_requests: 10,
            total_errors: 1,
            average_latency_ms: 50.0,
            error_rate: 0.1,
        };

        let combined = RpcMetricsSnapshot::aggregate([busy, quiet]);
        assert_eq!(combined.total_requests, 40);
        assert_eq!(combined.total_errors, 4);
        assert!((combined.average_latency_ms - 20.0).abs() < 0.01);
        assert!((combined.error_rate - 0.1).abs() < 0.001);

        let empty = RpcMetricsSnapshot::aggregate([]);
        assert_eq!(empty.total_requests, 0);
        assert_eq!(empty.average_latency_ms, 0.0);
    }

    #[test]
    fn empty_snapshot_reports_zeroes() {
        let snapshot = RpcMetrics::default().snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.average_latency_ms, 0.0);
        assert_eq!(snapshot.error_rate, 0.0);
    }
}
