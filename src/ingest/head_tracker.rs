//! Chain-head tracking over a live header subscription.
//!
//! Node push subscriptions can stall silently (half-closed sockets, proxy
//! timeouts) without surfacing an error, so a watchdog treats "no header
//! within the timeout" the same as a broken stream and forces a reconnect
//! with capped exponential backoff.

use crate::ingest::backoff::next_backoff;
use crate::rpc::{ChainClient, HeaderStream};
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RECONNECT_INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Monotonically non-decreasing best-known head height. Written by the
/// subscription task, read lock-free by the dispatch loop.
#[derive(Debug)]
pub(crate) struct HeadHeight {
    value: AtomicU64,
}

impl HeadHeight {
    pub(crate) fn new(initial: u64) -> Self {
        Self {
            value: AtomicU64::new(initial),
        }
    }

    pub(crate) fn observe(&self, height: u64) {
        self.value.fetch_max(height, Ordering::SeqCst);
    }

    pub(crate) fn current(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HeadTrackerParams {
    pub watchdog_timeout: Duration,
    pub reconnect_initial_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl Default for HeadTrackerParams {
    fn default() -> Self {
        Self {
            watchdog_timeout: DEFAULT_WATCHDOG_TIMEOUT,
            reconnect_initial_delay: DEFAULT_RECONNECT_INITIAL_DELAY,
            reconnect_max_delay: DEFAULT_RECONNECT_MAX_DELAY,
        }
    }
}

/// Tracks the best-known chain head via a live header subscription.
pub struct HeadTracker {
    height: Arc<HeadHeight>,
    handle: JoinHandle<()>,
}

impl HeadTracker {
    /// Seeds the known height with one synchronous RPC, opens the initial
    /// subscription, and spawns the event loop. Both startup calls are
    /// fatal on failure; reconnects after startup never are.
    pub async fn start(
        client: Arc<dyn ChainClient>,
        params: HeadTrackerParams,
        shutdown: CancellationToken,
        telemetry: Arc<Telemetry>,
    ) -> Result<Self> {
        let seed = client
            .head_height()
            .await
            .context("failed to query initial head height")?;
        let height = Arc::new(HeadHeight::new(seed));
        tracing::info!(head = seed, "seeded chain head");

        let stream = client
            .subscribe_heads()
            .await
            .context("failed to open head subscription")?;

        let tracker_loop = TrackerLoop {
            client,
            height: height.clone(),
            params,
            shutdown,
            telemetry,
        };
        let handle = tokio::spawn(tracker_loop.run(stream));

        Ok(Self { height, handle })
    }

    /// Latest known head height. Never blocks.
    pub fn current_height(&self) -> u64 {
        self.height.current()
    }

    pub(crate) fn height_handle(&self) -> Arc<HeadHeight> {
        self.height.clone()
    }

    pub(crate) async fn join(self) {
        if let Err(err) = self.handle.await {
            tracing::warn!(error = %err, "head tracker task panicked");
        }
    }
}

/// Subscription event loop. Owns the stream and all reconnect state so no
/// shared mutable captures leak across task boundaries.
struct TrackerLoop {
    client: Arc<dyn ChainClient>,
    height: Arc<HeadHeight>,
    params: HeadTrackerParams,
    shutdown: CancellationToken,
    telemetry: Arc<Telemetry>,
}

impl TrackerLoop {
    async fn run(self, mut stream: HeaderStream) {
        let mut deadline = Instant::now() + self.params.watchdog_timeout;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    break;
                }
                header = stream.next() => match header {
                    Some(header) => {
                        let head = header.number;
                        tracing::debug!(head, "new head observed");
                        self.height.observe(head);
                        deadline = Instant::now() + self.params.watchdog_timeout;
                    }
                    None => {
                        tracing::warn!("head subscription ended; reconnecting");
                        match self.reconnect_with_backoff().await {
                            Some(next_stream) => {
                                stream = next_stream;
                                deadline = Instant::now() + self.params.watchdog_timeout;
                            }
                            None => break,
                        }
                    }
                },
                _ = sleep_until(deadline) => {
                    tracing::warn!(
                        timeout = ?self.params.watchdog_timeout,
                        "no new heads within watchdog timeout; reconnecting"
                    );
                    match self.reconnect_with_backoff().await {
                        Some(next_stream) => {
                            stream = next_stream;
                            deadline = Instant::now() + self.params.watchdog_timeout;
                        }
                        None => break,
                    }
                }
            }
        }

        tracing::info!("head tracker stopped");
    }

    /// Retries the subscription with a delay starting at the configured
    /// initial value, doubling per failed attempt up to the cap. Returns
    /// `None` only on shutdown.
    async fn reconnect_with_backoff(&self) -> Option<HeaderStream> {
        let mut delay = self.params.reconnect_initial_delay;

        loop {
            if self.shutdown.is_cancelled() {
                return None;
            }

            match self.client.subscribe_heads().await {
                Ok(stream) => {
                    tracing::info!("head subscription reconnected");
                    self.telemetry.record_head_reconnect();
                    return Some(stream);
                }
                Err(err) => {
                    tracing::error!(
                        error = %err,
                        next_retry = ?delay,
                        "head subscription reconnect failed"
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return None,
                        _ = sleep(delay) => {}
                    }
                    delay = next_backoff(delay, self.params.reconnect_max_delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_height_is_monotonic() {
        let height = HeadHeight::new(10);
        height.observe(12);
        assert_eq!(height.current(), 12);

        height.observe(7);
        assert_eq!(height.current(), 12, "lower observations are ignored");

        height.observe(12);
        assert_eq!(height.current(), 12);
    }
}
