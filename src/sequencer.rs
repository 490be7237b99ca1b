//! Reordering buffer that restores strict sequence order across concurrent
//! producers.
//!
//! Fetch workers complete in arbitrary order; the [`Sequencer`] buffers
//! out-of-order commits and releases items to the injected [`Committer`] in
//! gapless ascending sequence order. The release send happens while the
//! state lock is held, so a full bounded sink throttles every producer and
//! the pending map never grows past the number of in-flight workers.

use crate::types::Sequenced;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Receives items released by the sequencer, in sequence order.
pub trait Committer<T>: Send + Sync {
    fn commit(&self, item: T) -> BoxFuture<'_, ()>;
}

/// Bounded output sink backed by an mpsc channel, with an explicit close
/// that ends the stream for the consumer side.
pub struct BoundedSink<T> {
    tx: Mutex<Option<mpsc::Sender<T>>>,
}

impl<T: Send + 'static> BoundedSink<T> {
    pub fn new(tx: mpsc::Sender<T>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    /// Closes the sink; the consumer's receive loop observes end-of-stream
    /// once buffered items are drained.
    pub async fn close(&self) {
        self.tx.lock().await.take();
    }

    /// Number of released items the consumer has not yet drained.
    pub async fn depth(&self) -> usize {
        match self.tx.lock().await.as_ref() {
            Some(tx) => tx.max_capacity().saturating_sub(tx.capacity()),
            None => 0,
        }
    }
}

impl<T: Send + 'static> Committer<T> for BoundedSink<T> {
    fn commit(&self, item: T) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let guard = self.tx.lock().await;
            match guard.as_ref() {
                Some(tx) => {
                    if tx.send(item).await.is_err() {
                        tracing::warn!("output receiver dropped; discarding released item");
                    }
                }
                None => {
                    tracing::warn!("output sink already closed; discarding released item");
                }
            }
        })
    }
}

/// Protocol violations and rejections surfaced by [`Sequencer::commit`].
///
/// `StaleCommit` is a rejection (the item was already released and must not
/// be re-emitted); the other variants indicate a bug in the caller and are
/// expected to be escalated as fatal.
#[derive(Debug)]
pub enum SequencerError {
    NotInitialized,
    AlreadyInitialized,
    DuplicateCommit { sequence: u64 },
    StaleCommit { sequence: u64, next_expected: u64 },
}

impl std::fmt::Display for SequencerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequencerError::NotInitialized => {
                write!(f, "commit before init")
            }
            SequencerError::AlreadyInitialized => {
                write!(f, "sequencer initialized twice")
            }
            SequencerError::DuplicateCommit { sequence } => {
                write!(f, "duplicate commit for sequence {sequence}")
            }
            SequencerError::StaleCommit {
                sequence,
                next_expected,
            } => {
                write!(
                    f,
                    "stale commit for sequence {sequence} (next expected {next_expected})"
                )
            }
        }
    }
}

impl std::error::Error for SequencerError {}

struct SequencerState<T> {
    next_expected: Option<u64>,
    pending: HashMap<u64, T>,
}

/// Thread-safe reordering buffer. `init` must be called exactly once before
/// the first `commit`.
pub struct Sequencer<T> {
    state: Mutex<SequencerState<T>>,
    sink: Arc<dyn Committer<T>>,
}

impl<T: Sequenced + Send + 'static> Sequencer<T> {
    pub fn new(sink: Arc<dyn Committer<T>>) -> Self {
        Self {
            state: Mutex::new(SequencerState {
                next_expected: None,
                pending: HashMap::new(),
            }),
            sink,
        }
    }

    /// Sets the first sequence number allowed to be released.
    pub async fn init(&self, start: u64) -> Result<(), SequencerError> {
        let mut state = self.state.lock().await;
        if state.next_expected.is_some() {
            return Err(SequencerError::AlreadyInitialized);
        }
        state.next_expected = Some(start);
        Ok(())
    }

    /// Commits one item. Safe to call from any number of concurrent tasks.
    ///
    /// If the item carries the next expected sequence number it is released
    /// immediately, followed by every contiguous pending successor. Future
    /// numbers are buffered; numbers below `next_expected` are rejected.
    /// Releases happen under the internal lock, so backpressure from the
    /// sink serializes and throttles all committers.
    pub async fn commit(&self, item: T) -> Result<(), SequencerError> {
        let mut state = self.state.lock().await;
        let Some(mut next) = state.next_expected else {
            return Err(SequencerError::NotInitialized);
        };

        let sequence = item.sequence();
        if sequence < next {
            tracing::warn!(
                sequence,
                next_expected = next,
                "rejecting stale commit; item was already released"
            );
            return Err(SequencerError::StaleCommit {
                sequence,
                next_expected: next,
            });
        }

        if sequence > next {
            if state.pending.contains_key(&sequence) {
                return Err(SequencerError::DuplicateCommit { sequence });
            }
            state.pending.insert(sequence, item);
            return Ok(());
        }

        self.sink.commit(item).await;
        next += 1;
        while let Some(ready) = state.pending.remove(&next) {
            self.sink.commit(ready).await;
            next += 1;
        }
        state.next_expected = Some(next);
        Ok(())
    }

    /// Next sequence number allowed to be released, or `None` before `init`.
    pub async fn next_expected(&self) -> Option<u64> {
        self.state.lock().await.next_expected
    }

    /// Number of buffered out-of-order items.
    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}
