//! Round-robin fan-out over several node endpoints.
//!
//! The pool implements [`ChainClient`] itself, so the rest of the pipeline
//! never knows whether it talks to one node or many. Each call goes to the
//! next client in rotation; there is no health tracking, the per-task retry
//! budget absorbs a flaky endpoint.

use crate::rpc::client::{ChainClient, HeaderStream};
use crate::rpc::metrics::RpcMetricsSnapshot;
use alloy::rpc::types::{Block, TransactionReceipt};
use anyhow::{bail, Result};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub struct ClientPool {
    clients: Vec<Arc<dyn ChainClient>>,
    cursor: AtomicUsize,
}

impl ClientPool {
    pub fn new(clients: Vec<Arc<dyn ChainClient>>) -> Result<Self> {
        if clients.is_empty() {
            bail!("client pool requires at least one client");
        }
        Ok(Self {
            clients,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn next(&self) -> &Arc<dyn ChainClient> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        &self.clients[index]
    }
}

impl ChainClient for ClientPool {
    fn head_height(&self) -> BoxFuture<'_, Result<u64>> {
        self.next().head_height()
    }

    fn block_by_number(&self, height: u64) -> BoxFuture<'_, Result<Block>> {
        self.next().block_by_number(height)
    }

    fn block_receipts(&self, height: u64) -> BoxFuture<'_, Result<Vec<TransactionReceipt>>> {
        self.next().block_receipts(height)
    }

    fn subscribe_heads(&self) -> BoxFuture<'_, Result<HeaderStream>> {
        self.next().subscribe_heads()
    }

    fn rpc_metrics(&self) -> Option<RpcMetricsSnapshot> {
        Some(RpcMetricsSnapshot::aggregate(
            self.clients
                .iter()
                .filter_map(|client| client.rpc_metrics()),
        ))
    }
}
