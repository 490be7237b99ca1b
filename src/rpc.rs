//! EVM node access: the `ChainClient` trait consumed by the pipeline, the
//! alloy-backed implementation, a round-robin client pool, and request
//! metrics.

pub mod client;
pub mod metrics;
pub mod pool;

pub use client::{AlloyChainClient, ChainClient, HeaderStream, RpcError};
pub use metrics::RpcMetricsSnapshot;
pub use pool::ClientPool;

#[cfg(test)]
pub(crate) mod tests {
    use super::client::{ChainClient, HeaderStream};
    use alloy::rpc::types::{Block, TransactionReceipt};
    use anyhow::{anyhow, Result};
    use futures::future::BoxFuture;

    /// Minimal stub answering only `head_height`; every other call fails.
    pub(crate) struct StaticHeadClient {
        head: u64,
    }

    impl StaticHeadClient {
        pub(crate) fn new(head: u64) -> Self {
            Self { head }
        }
    }

    impl ChainClient for StaticHeadClient {
        fn head_height(&self) -> BoxFuture<'_, Result<u64>> {
            Box::pin(async move { Ok(self.head) })
        }

        fn block_by_number(&self, height: u64) -> BoxFuture<'_, Result<Block>> {
            Box::pin(async move { Err(anyhow!("no block {height} in static client")) })
        }

        fn block_receipts(&self, height: u64) -> BoxFuture<'_, Result<Vec<TransactionReceipt>>> {
            Box::pin(async move { Err(anyhow!("no receipts {height} in static client")) })
        }

        fn subscribe_heads(&self) -> BoxFuture<'_, Result<HeaderStream>> {
            Box::pin(async move { Err(anyhow!("static client has no subscriptions")) })
        }
    }
}
