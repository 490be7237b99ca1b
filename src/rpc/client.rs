//! The `ChainClient` trait consumed by the pipeline and the alloy-backed
//! implementation talking to an EVM node over HTTP plus a WebSocket
//! endpoint for head subscriptions.

use crate::rpc::metrics::{RpcMetrics, RpcMetricsSnapshot};
use alloy::eips::BlockId;
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{Block, Header, TransactionReceipt};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use tokio::time::Instant;

/// Live header stream produced by [`ChainClient::subscribe_heads`]. Ends
/// when the underlying subscription drops; the caller reconnects.
pub type HeaderStream = Pin<Box<dyn futures::Stream<Item = Header> + Send>>;

#[derive(Debug)]
pub enum RpcError {
    MissingBlock { height: u64 },
    MissingReceipts { height: u64 },
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::MissingBlock { height } => {
                write!(f, "node returned no block at height {height}")
            }
            RpcError::MissingReceipts { height } => {
                write!(f, "node returned no receipts for height {height}")
            }
        }
    }
}

impl std::error::Error for RpcError {}

/// Everything the pipeline needs from a node. Implemented by the alloy
/// client, the round-robin pool, and test doubles.
pub trait ChainClient: Send + Sync {
    /// Current chain head height.
    fn head_height(&self) -> BoxFuture<'_, Result<u64>>;

    /// Full block (header, body, transactions) at `height`.
    fn block_by_number(&self, height: u64) -> BoxFuture<'_, Result<Block>>;

    /// All transaction receipts of the block at `height`, in transaction
    /// order.
    fn block_receipts(&self, height: u64) -> BoxFuture<'_, Result<Vec<TransactionReceipt>>>;

    /// Opens a fresh new-heads subscription.
    fn subscribe_heads(&self) -> BoxFuture<'_, Result<HeaderStream>>;

    /// Aggregated request counters, where the implementation keeps any.
    fn rpc_metrics(&self) -> Option<RpcMetricsSnapshot> {
        None
    }
}

/// alloy-backed [`ChainClient`]: one HTTP provider for request/response
/// calls, a WebSocket endpoint dialed per subscription.
pub struct AlloyChainClient {
    http: DynProvider,
    ws_url: String,
    metrics: Arc<RpcMetrics>,
}

impl AlloyChainClient {
    pub async fn connect(http_url: &str, ws_url: &str) -> Result<Self> {
        let http = ProviderBuilder::new()
            .connect(http_url)
            .await
            .with_context(|| format!("failed to connect to rpc endpoint {http_url}"))?
            .erased();

        Ok(Self {
            http,
            ws_url: ws_url.to_owned(),
            metrics: Arc::new(RpcMetrics::default()),
        })
    }

    async fn timed<T, F>(&self, operation: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = operation.await;
        match &result {
            Ok(_) => self.metrics.record_success(started.elapsed()),
            Err(_) => self.metrics.record_failure(started.elapsed()),
        }
        result
    }
}

impl ChainClient for AlloyChainClient {
    fn head_height(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(self.timed(async {
            self.http
                .get_block_number()
                .await
                .context("eth_blockNumber failed")
        }))
    }

    fn block_by_number(&self, height: u64) -> BoxFuture<'_, Result<Block>> {
        Box::pin(self.timed(async move {
            let block = self
                .http
                .get_block_by_number(height.into())
                .full()
                .await
                .with_context(|| format!("eth_getBlockByNumber({height}) failed"))?;
            block.ok_or_else(|| RpcError::MissingBlock { height }.into())
        }))
    }

    fn block_receipts(&self, height: u64) -> BoxFuture<'_, Result<Vec<TransactionReceipt>>> {
        Box::pin(self.timed(async move {
            let receipts = self
                .http
                .get_block_receipts(BlockId::number(height))
                .await
                .with_context(|| format!("eth_getBlockReceipts({height}) failed"))?;
            receipts.ok_or_else(|| RpcError::MissingReceipts { height }.into())
        }))
    }

    fn subscribe_heads(&self) -> BoxFuture<'_, Result<HeaderStream>> {
        Box::pin(async move {
            let ws = ProviderBuilder::new()
                .connect_ws(WsConnect::new(self.ws_url.clone()))
                .await
                .with_context(|| format!("failed to dial ws endpoint {}", self.ws_url))?;
            let subscription = ws
                .subscribe_blocks()
                .await
                .context("eth_subscribe(newHeads) failed")?;

            // The provider owns the ws connection; thread it through the
            // stream state so the subscription outlives this call.
            let stream = futures::stream::unfold(
                (ws, subscription.into_stream()),
                |(ws, mut inner)| async move {
                    let header = inner.next().await?;
                    Some((header, (ws, inner)))
                },
            );
            Ok(Box::pin(stream) as HeaderStream)
        })
    }

    fn rpc_metrics(&self) -> Option<RpcMetricsSnapshot> {
        Some(self.metrics.snapshot())
    }
}
