use crate::rpc::ChainClient;
use crate::sequencer::BoundedSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls
/// back to `info`. Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Count/total pair for a latency series; enough to derive an average
/// without a histogram dependency.
#[derive(Debug, Default)]
struct LatencyStat {
    count: AtomicU64,
    total_ns: AtomicU64,
}

impl LatencyStat {
    fn record(&self, latency: Duration) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
    }

    fn average_ms(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        (self.total_ns.load(Ordering::Relaxed) as f64 / count as f64) / 1_000_000.0
    }
}

/// Lightweight rolling counters used to derive runtime metrics.
#[derive(Default, Debug)]
pub struct Telemetry {
    fetched_blocks: AtomicU64,
    fetch_failures: AtomicU64,
    fetch_retries: AtomicU64,
    head_reconnects: AtomicU64,
    rejected_commits: AtomicU64,
    block_fetch: LatencyStat,
    receipts_fetch: LatencyStat,
    block_delay: LatencyStat,
}

impl Telemetry {
    pub fn record_fetched_block(&self) {
        self.fetched_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_retry(&self) {
        self.fetch_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_head_reconnect(&self) {
        self.head_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_commit(&self) {
        self.rejected_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_block_fetch(&self, latency: Duration) {
        self.block_fetch.record(latency);
    }

    pub fn record_receipts_fetch(&self, latency: Duration) {
        self.receipts_fetch.record(latency);
    }

    /// Wall-clock lag between a block's timestamp and its arrival here.
    pub fn record_block_delay(&self, delay: Duration) {
        self.block_delay.record(delay);
    }

    pub fn fetched_blocks(&self) -> u64 {
        self.fetched_blocks.load(Ordering::Relaxed)
    }

    pub fn fetch_failures(&self) -> u64 {
        self.fetch_failures.load(Ordering::Relaxed)
    }

    pub fn head_reconnects(&self) -> u64 {
        self.head_reconnects.load(Ordering::Relaxed)
    }

    pub fn rejected_commits(&self) -> u64 {
        self.rejected_commits.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            fetched_blocks: self.fetched_blocks.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            fetch_retries: self.fetch_retries.load(Ordering::Relaxed),
            head_reconnects: self.head_reconnects.load(Ordering::Relaxed),
            rejected_commits: self.rejected_commits.load(Ordering::Relaxed),
            avg_block_fetch_ms: self.block_fetch.average_ms(),
            avg_receipts_fetch_ms: self.receipts_fetch.average_ms(),
            avg_block_delay_ms: self.block_delay.average_ms(),
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TelemetrySnapshot {
    pub fetched_blocks: u64,
    pub fetch_failures: u64,
    pub fetch_retries: u64,
    pub head_reconnects: u64,
    pub rejected_commits: u64,
    pub avg_block_fetch_ms: f64,
    pub avg_receipts_fetch_ms: f64,
    pub avg_block_delay_ms: f64,
}

/// Spawns a background task that periodically logs throughput, output queue
/// depth, fetch error counters, and the client's aggregated RPC stats.
pub fn spawn_metrics_reporter<T: Send + 'static>(
    telemetry: Arc<Telemetry>,
    sink: Arc<BoundedSink<T>>,
    client: Arc<dyn ChainClient>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "chainscan::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current_snapshot = telemetry.snapshot();
                    let fetched_delta = current_snapshot
                        .fetched_blocks
                        .saturating_sub(last_snapshot.fetched_blocks);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        fetched_delta as f64 / elapsed
                    };
                    let output_depth = sink.depth().await;
                    let rpc = client.rpc_metrics().unwrap_or_default();

                    tracing::info!(
                        target: "chainscan::metrics",
                        throughput = format!("{throughput:.2}"),
                        fetched = current_snapshot.fetched_blocks,
                        output_depth,
                        fetch_failures = current_snapshot.fetch_failures,
                        fetch_retries = current_snapshot.fetch_retries,
                        head_reconnects = current_snapshot.head_reconnects,
                        rejected_commits = current_snapshot.rejected_commits,
                        avg_block_fetch_ms = format!("{:.2}", current_snapshot.avg_block_fetch_ms),
                        avg_receipts_fetch_ms =
                            format!("{:.2}", current_snapshot.avg_receipts_fetch_ms),
                        avg_block_delay_ms = format!("{:.2}", current_snapshot.avg_block_delay_ms),
                        rpc_requests = rpc.total_requests,
                        rpc_error_rate = format!("{:.3}", rpc.error_rate),
                        rpc_avg_latency_ms = format!("{:.2}", rpc.average_latency_ms),
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current_snapshot;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
