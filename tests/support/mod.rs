#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use alloy::rpc::types::{Block, Header, TransactionReceipt};
use anyhow::{anyhow, Result};
use chainscan::{ChainClient, HeaderStream};
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

pub fn test_header(height: u64) -> Header {
    Header {
        hash: Default::default(),
        inner: alloy::consensus::Header {
            number: height,
            timestamp: 1_700_000_000 + height,
            ..Default::default()
        },
        total_difficulty: None,
        size: None,
    }
}

pub fn test_block(height: u64) -> Block {
    Block {
        header: test_header(height),
        ..Default::default()
    }
}

/// Scripted in-process chain: per-height fetch failures and delays, an
/// adjustable head, and controllable head subscriptions (streams can be
/// ended or left silent to simulate stalls).
pub struct MockChainClient {
    head: AtomicU64,
    fetch_failures: Mutex<HashMap<u64, usize>>,
    fetch_delays: Mutex<HashMap<u64, Duration>>,
    subscribe_failures: AtomicUsize,
    subscribe_calls: AtomicUsize,
    head_senders: Mutex<Vec<mpsc::UnboundedSender<Header>>>,
}

impl MockChainClient {
    pub fn new(head: u64) -> Self {
        Self {
            head: AtomicU64::new(head),
            fetch_failures: Mutex::new(HashMap::new()),
            fetch_delays: Mutex::new(HashMap::new()),
            subscribe_failures: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
            head_senders: Mutex::new(Vec::new()),
        }
    }

    /// The next `count` fetches of `height` fail before one succeeds.
    pub fn fail_fetches(&self, height: u64, count: usize) {
        self.fetch_failures
            .lock()
            .expect("mock poisoned")
            .insert(height, count);
    }

    /// Delays every fetch of `height`, shuffling worker completion order.
    pub fn delay_fetch(&self, height: u64, delay: Duration) {
        self.fetch_delays
            .lock()
            .expect("mock poisoned")
            .insert(height, delay);
    }

    /// The next `count` subscription attempts fail.
    pub fn fail_next_subscribes(&self, count: usize) {
        self.subscribe_failures.store(count, Ordering::SeqCst);
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Advances the head and announces it on every open subscription.
    pub fn push_head(&self, height: u64) {
        self.head.fetch_max(height, Ordering::SeqCst);
        let header = test_header(height);
        self.head_senders
            .lock()
            .expect("mock poisoned")
            .retain(|sender| sender.send(header.clone()).is_ok());
    }

    /// Ends every open subscription stream, as a dropped socket would.
    pub fn drop_subscriptions(&self) {
        self.head_senders.lock().expect("mock poisoned").clear();
    }
}

impl ChainClient for MockChainClient {
    fn head_height(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move { Ok(self.head.load(Ordering::SeqCst)) })
    }

    fn block_by_number(&self, height: u64) -> BoxFuture<'_, Result<Block>> {
        Box::pin(async move {
            let delay = self
                .fetch_delays
                .lock()
                .expect("mock poisoned")
                .get(&height)
                .copied();
            if let Some(delay) = delay {
                sleep(delay).await;
            }

            let should_fail = {
                let mut failures = self.fetch_failures.lock().expect("mock poisoned");
                match failures.get_mut(&height) {
                    Some(remaining) if *remaining > 0 => {
                        *remaining -= 1;
                        true
                    }
                    _ => false,
                }
            };
            if should_fail {
                return Err(anyhow!("scripted fetch failure at height {height}"));
            }

            Ok(test_block(height))
        })
    }

    fn block_receipts(&self, _height: u64) -> BoxFuture<'_, Result<Vec<TransactionReceipt>>> {
        Box::pin(async move { Ok(Vec::new()) })
    }

    fn subscribe_heads(&self) -> BoxFuture<'_, Result<HeaderStream>> {
        Box::pin(async move {
            self.subscribe_calls.fetch_add(1, Ordering::SeqCst);

            let remaining = self.subscribe_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.subscribe_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(anyhow!("scripted subscribe failure"));
            }

            let (tx, rx) = mpsc::unbounded_channel();
            self.head_senders.lock().expect("mock poisoned").push(tx);
            let stream = futures::stream::unfold(rx, |mut rx| async move {
                let header = rx.recv().await?;
                Some((header, rx))
            });
            Ok(Box::pin(stream) as HeaderStream)
        })
    }
}

/// Polls `condition` until it holds or `limit` elapses.
pub async fn wait_until<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}
