//! Resume-on-restart seam: where the last fully processed height lives.

use anyhow::Result;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of the last fully processed block height. A return of `0` means
/// no checkpoint exists and ingestion should start from the live head.
pub trait CheckpointStore: Send + Sync {
    fn last_finished_height(&self) -> BoxFuture<'_, Result<u64>>;
}

/// Checkpoint store that never has a checkpoint.
pub struct NoCheckpoint;

impl CheckpointStore for NoCheckpoint {
    fn last_finished_height(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async { Ok(0) })
    }
}

/// In-process checkpoint backed by an atomic, advanced by the consumer as
/// blocks finish. Useful for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryCheckpoint {
    finished: AtomicU64,
}

impl InMemoryCheckpoint {
    pub fn new(finished: u64) -> Self {
        Self {
            finished: AtomicU64::new(finished),
        }
    }

    pub fn mark_finished(&self, height: u64) {
        self.finished.fetch_max(height, Ordering::SeqCst);
    }

    pub fn finished(&self) -> u64 {
        self.finished.load(Ordering::SeqCst)
    }
}

impl CheckpointStore for InMemoryCheckpoint {
    fn last_finished_height(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move { Ok(self.finished()) })
    }
}
