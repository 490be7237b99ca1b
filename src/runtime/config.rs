use crate::ingest::backoff::RetryPolicy;
use crate::ingest::dispatcher::DEFAULT_HEAD_POLL_INTERVAL;
use crate::ingest::head_tracker::{
    HeadTrackerParams, DEFAULT_RECONNECT_INITIAL_DELAY, DEFAULT_RECONNECT_MAX_DELAY,
    DEFAULT_WATCHDOG_TIMEOUT,
};
use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_TASK_QUEUE_CAPACITY: usize = 64;
const DEFAULT_OUTPUT_CAPACITY: usize = 10;
const DEFAULT_RETRY_ATTEMPTS: usize = 3;
const DEFAULT_RETRY_INITIAL_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

/// Runtime configuration for the ingestion pipeline.
///
/// All instances must be constructed via [`PipelineConfig::builder`] so
/// invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    http_urls: Vec<String>,
    ws_url: String,
    worker_count: usize,
    task_queue_capacity: usize,
    output_capacity: usize,
    retry_attempts: usize,
    retry_initial_delay: Duration,
    retry_max_delay: Duration,
    watchdog_timeout: Duration,
    reconnect_initial_delay: Duration,
    reconnect_max_delay: Duration,
    head_poll_interval: Duration,
    metrics_interval: Duration,
    start_height: u64,
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// HTTP JSON-RPC endpoints, used round-robin by the fetch workers.
    pub fn http_urls(&self) -> &[String] {
        &self.http_urls
    }

    /// WebSocket endpoint used for the new-heads subscription.
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Capacity of the bounded height queue between dispatcher and workers.
    pub fn task_queue_capacity(&self) -> usize {
        self.task_queue_capacity
    }

    /// Capacity of the bounded output channel of ordered blocks.
    pub fn output_capacity(&self) -> usize {
        self.output_capacity
    }

    /// Explicit starting height; `0` means resolve from checkpoint or head.
    pub fn start_height(&self) -> u64 {
        self.start_height
    }

    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub fn head_poll_interval(&self) -> Duration {
        self.head_poll_interval
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: self.retry_initial_delay,
            max_delay: self.retry_max_delay,
            max_attempts: self.retry_attempts,
        }
    }

    pub(crate) fn head_tracker_params(&self) -> HeadTrackerParams {
        HeadTrackerParams {
            watchdog_timeout: self.watchdog_timeout,
            reconnect_initial_delay: self.reconnect_initial_delay,
            reconnect_max_delay: self.reconnect_max_delay,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.http_urls.is_empty() {
            bail!("at least one http url is required");
        }
        for url in &self.http_urls {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("http url {url} must start with http:// or https://");
            }
        }
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            bail!("ws_url must start with ws:// or wss://");
        }
        if self.worker_count == 0 {
            bail!("worker_count must be greater than 0");
        }
        if self.task_queue_capacity == 0 {
            bail!("task_queue_capacity must be greater than 0");
        }
        if self.output_capacity == 0 {
            bail!("output_capacity must be greater than 0");
        }
        if self.retry_attempts == 0 {
            bail!("retry_attempts must be greater than 0");
        }
        if self.retry_initial_delay.is_zero() {
            bail!("retry_initial_delay must be greater than 0");
        }
        if self.retry_max_delay < self.retry_initial_delay {
            bail!("retry_max_delay must be at least retry_initial_delay");
        }
        if self.watchdog_timeout.is_zero() {
            bail!("watchdog_timeout must be greater than 0");
        }
        if self.reconnect_initial_delay.is_zero() {
            bail!("reconnect_initial_delay must be greater than 0");
        }
        if self.reconnect_max_delay < self.reconnect_initial_delay {
            bail!("reconnect_max_delay must be at least reconnect_initial_delay");
        }
        if self.head_poll_interval.is_zero() {
            bail!("head_poll_interval must be greater than 0");
        }
        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct PipelineConfigBuilder {
    http_urls: Vec<String>,
    ws_url: Option<String>,
    worker_count: Option<usize>,
    task_queue_capacity: Option<usize>,
    output_capacity: Option<usize>,
    retry_attempts: Option<usize>,
    retry_initial_delay: Option<Duration>,
    retry_max_delay: Option<Duration>,
    watchdog_timeout: Option<Duration>,
    reconnect_initial_delay: Option<Duration>,
    reconnect_max_delay: Option<Duration>,
    head_poll_interval: Option<Duration>,
    metrics_interval: Option<Duration>,
    start_height: Option<u64>,
}

impl PipelineConfigBuilder {
    pub fn http_url(mut self, url: impl Into<String>) -> Self {
        self.http_urls.push(url.into());
        self
    }

    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    pub fn task_queue_capacity(mut self, capacity: usize) -> Self {
        self.task_queue_capacity = Some(capacity);
        self
    }

    pub fn output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = Some(capacity);
        self
    }

    pub fn retry_attempts(mut self, attempts: usize) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    pub fn retry_initial_delay(mut self, delay: Duration) -> Self {
        self.retry_initial_delay = Some(delay);
        self
    }

    pub fn retry_max_delay(mut self, delay: Duration) -> Self {
        self.retry_max_delay = Some(delay);
        self
    }

    pub fn watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.watchdog_timeout = Some(timeout);
        self
    }

    pub fn reconnect_initial_delay(mut self, delay: Duration) -> Self {
        self.reconnect_initial_delay = Some(delay);
        self
    }

    pub fn reconnect_max_delay(mut self, delay: Duration) -> Self {
        self.reconnect_max_delay = Some(delay);
        self
    }

    pub fn head_poll_interval(mut self, interval: Duration) -> Self {
        self.head_poll_interval = Some(interval);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn start_height(mut self, height: u64) -> Self {
        self.start_height = Some(height);
        self
    }

    pub fn build(self) -> Result<PipelineConfig> {
        let config = PipelineConfig {
            http_urls: self.http_urls,
            ws_url: self.ws_url.context("ws_url is required")?,
            worker_count: self.worker_count.context("worker_count is required")?,
            task_queue_capacity: self.task_queue_capacity.unwrap_or(DEFAULT_TASK_QUEUE_CAPACITY),
            output_capacity: self.output_capacity.unwrap_or(DEFAULT_OUTPUT_CAPACITY),
            retry_attempts: self.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS),
            retry_initial_delay: self
                .retry_initial_delay
                .unwrap_or(DEFAULT_RETRY_INITIAL_DELAY),
            retry_max_delay: self.retry_max_delay.unwrap_or(DEFAULT_RETRY_MAX_DELAY),
            watchdog_timeout: self.watchdog_timeout.unwrap_or(DEFAULT_WATCHDOG_TIMEOUT),
            reconnect_initial_delay: self
                .reconnect_initial_delay
                .unwrap_or(DEFAULT_RECONNECT_INITIAL_DELAY),
            reconnect_max_delay: self.reconnect_max_delay.unwrap_or(DEFAULT_RECONNECT_MAX_DELAY),
            head_poll_interval: self.head_poll_interval.unwrap_or(DEFAULT_HEAD_POLL_INTERVAL),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            start_height: self.start_height.unwrap_or(0),
        };

        config.validate()?;
        Ok(config)
    }
}
